use vau_core::{Span, VauError, Value};

use crate::lexer::{tokenize, SpannedToken, Token};

/// A pending element of the list under construction. `Dot` marks the `.` in
/// `(a . b)` and never escapes the parser.
enum Item {
    Value(Value),
    Dot(Span),
}

struct Parser {
    tokens: std::vec::IntoIter<SpannedToken>,
    /// Enclosing lists, each with the span of its opening paren.
    stack: Vec<(Vec<Item>, Span)>,
    objects: Vec<Item>,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens: tokens.into_iter(),
            stack: Vec::new(),
            objects: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Value>, VauError> {
        while let Some(SpannedToken { token, span }) = self.tokens.next() {
            match token {
                Token::LParen => {
                    let outer = std::mem::take(&mut self.objects);
                    self.stack.push((outer, span));
                }
                Token::RParen => self.close_list(span)?,
                Token::Dot => self.objects.push(Item::Dot(span)),
                Token::Colon => {
                    let keyword = self.keyword(span)?;
                    self.objects.push(Item::Value(keyword));
                }
                Token::Space => {}
                Token::Unit => self.push(Value::Unit),
                Token::Bool(b) => self.push(Value::Bool(b)),
                Token::Number(n) => self.push(Value::Number(n)),
                Token::String(s) => self.push(Value::string(&s)),
                Token::Symbol(s) => self.push(Value::symbol(&s)),
            }
        }

        if let Some((_, open)) = self.stack.last() {
            return Err(VauError::syntax("unterminated list", *open));
        }
        self.objects
            .into_iter()
            .map(|item| match item {
                Item::Value(v) => Ok(v),
                Item::Dot(span) => Err(VauError::syntax("'.' outside of a list", span)),
            })
            .collect()
    }

    fn push(&mut self, value: Value) {
        self.objects.push(Item::Value(value));
    }

    fn keyword(&mut self, colon: Span) -> Result<Value, VauError> {
        match self.tokens.next() {
            Some(SpannedToken {
                token: Token::Symbol(name),
                ..
            }) => Ok(Value::keyword(&name)),
            Some(SpannedToken { token, span }) => Err(VauError::syntax(
                format!("expected a name after ':', got {token:?}"),
                span,
            )),
            None => Err(VauError::syntax("expected a name after ':'", colon)),
        }
    }

    /// Fold the current items into a list and hand it to the enclosing one.
    fn close_list(&mut self, span: Span) -> Result<(), VauError> {
        let Some((outer, _)) = self.stack.pop() else {
            return Err(VauError::syntax("unexpected ')'", span));
        };
        let mut items = std::mem::replace(&mut self.objects, outer);

        // `(a . b)`: a dot as the second-to-last of at least three items
        // makes the last item the tail.
        let dot_before_last =
            |items: &[Item]| items.len() >= 2 && matches!(items.last(), Some(Item::Dot(_)));
        let tail = match items.pop() {
            Some(Item::Value(v)) if dot_before_last(&items) => {
                items.pop();
                v
            }
            Some(Item::Dot(span)) if dot_before_last(&items) => {
                return Err(VauError::syntax("'.' must be followed by a value", span))
            }
            Some(last) => {
                items.push(last);
                Value::Unit
            }
            None => Value::Unit,
        };

        let mut list = tail;
        for item in items.into_iter().rev() {
            match item {
                Item::Value(v) => list = Value::pair(v, list),
                Item::Dot(span) => {
                    return Err(VauError::syntax(
                        "'.' may only appear before the last element",
                        span,
                    ))
                }
            }
        }
        self.push(list);
        Ok(())
    }
}

/// Read every top-level form in `input`.
pub fn read(input: &str) -> Result<Vec<Value>, VauError> {
    let tokens = tokenize(input)?;
    Parser::new(tokens).run()
}

/// Read the first form in `input`, or `#` if there is none.
pub fn read_one(input: &str) -> Result<Value, VauError> {
    Ok(read(input)?.into_iter().next().unwrap_or(Value::Unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vau_core::show;

    fn sym(s: &str) -> Value {
        Value::symbol(s)
    }

    fn syntax_err(input: &str) -> (String, Span) {
        match read(input) {
            Err(VauError::Syntax { message, span }) => (message, span),
            other => panic!("expected syntax error for `{input}`, got {other:?}"),
        }
    }

    #[test]
    fn test_read_atoms() {
        assert_eq!(read_one("foo").unwrap(), sym("foo"));
        assert_eq!(read_one("#").unwrap(), Value::Unit);
        assert_eq!(read_one("#t").unwrap(), Value::Bool(true));
        assert_eq!(read_one("#f").unwrap(), Value::Bool(false));
        assert_eq!(read_one(":key").unwrap(), Value::keyword("key"));
        assert_eq!(read_one("42").unwrap(), Value::Number(42.0));
        assert_eq!(read_one("\"hi\"").unwrap(), Value::string("hi"));
    }

    #[test]
    fn test_read_proper_list() {
        let v = read_one("(a b c)").unwrap();
        assert_eq!(v, Value::list(vec![sym("a"), sym("b"), sym("c")]));
        assert!(v.is_list());
    }

    #[test]
    fn test_read_dotted_pair() {
        let v = read_one("(a . b)").unwrap();
        assert_eq!(v, Value::pair(sym("a"), sym("b")));
        assert!(!v.is_list());
    }

    #[test]
    fn test_read_dotted_tail() {
        let v = read_one("(a b . c)").unwrap();
        assert_eq!(v, Value::list_with_tail(vec![sym("a"), sym("b")], sym("c")));
    }

    #[test]
    fn test_dot_before_list_tail_is_proper() {
        let v = read_one("(a . (b c))").unwrap();
        assert_eq!(v, Value::list(vec![sym("a"), sym("b"), sym("c")]));
        assert!(v.is_list());
    }

    #[test]
    fn test_empty_list_is_unit() {
        assert_eq!(read_one("()").unwrap(), Value::Unit);
        assert_eq!(read_one("(())").unwrap(), Value::list(vec![Value::Unit]));
    }

    #[test]
    fn test_nested() {
        let v = read_one("(vau (x . rest) e (pair x rest))").unwrap();
        assert_eq!(show(&v), "(vau (x . rest) e (pair x rest))");
    }

    #[test]
    fn test_read_many_forms() {
        let forms = read("a (b) :c #t").unwrap();
        assert_eq!(
            forms,
            vec![
                sym("a"),
                Value::list(vec![sym("b")]),
                Value::keyword("c"),
                Value::Bool(true)
            ]
        );
        assert!(read("").unwrap().is_empty());
        assert!(read("  ; nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_literals() {
        for src in [
            "#", "#t", "#f", "foo", "(a b c)", "(a . b)", ":key", "(a (b . c) #)", "-3.25",
            "\"x\\\"y\"",
        ] {
            let v = read_one(src).unwrap();
            assert_eq!(read_one(&show(&v)).unwrap(), v, "round trip of {src}");
        }
    }

    #[test]
    fn test_dot_without_tail() {
        let (msg, span) = syntax_err("(a . )");
        assert!(msg.contains("'.'"), "{msg}");
        assert_eq!(span, Span::new(1, 4));
    }

    #[test]
    fn test_dot_misplaced() {
        syntax_err("(. a)");
        syntax_err("(a . b c)");
        syntax_err("(a . . b)");
        syntax_err("(a . .)");
        syntax_err("a . b");
    }

    #[test]
    fn test_dot_needs_two_items_before_tail() {
        assert_eq!(
            read_one("(a . b)").unwrap(),
            Value::pair(sym("a"), sym("b"))
        );
        let (_, span) = syntax_err("(. b)");
        assert_eq!(span, Span::new(1, 2));
        let (msg, span) = syntax_err("(a . .)");
        assert_eq!(msg, "'.' must be followed by a value");
        assert_eq!(span, Span::new(1, 6));
    }

    #[test]
    fn test_unmatched_close() {
        let (_, span) = syntax_err("a)");
        assert_eq!(span, Span::new(1, 2));
    }

    #[test]
    fn test_unterminated_list() {
        let (msg, span) = syntax_err("(a (b)");
        assert_eq!(msg, "unterminated list");
        assert_eq!(span, Span::new(1, 1));
    }

    #[test]
    fn test_colon_needs_symbol() {
        syntax_err(": a");
        syntax_err(":(a)");
        syntax_err(":");
        syntax_err(":12");
    }

    #[test]
    fn test_unknown_sharp_constant() {
        syntax_err("#nope");
    }
}
