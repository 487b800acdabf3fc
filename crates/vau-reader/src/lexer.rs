use vau_core::{Span, VauError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Dot,
    Colon,
    Space,
    Unit,
    Bool(bool),
    Number(f64),
    String(String),
    Symbol(String),
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn is_space(ch: char) -> bool {
    ch.is_whitespace()
}

/// Characters that end a symbol or constant run.
fn is_separator(ch: char) -> bool {
    matches!(ch, '(' | ')' | '"' | ';') || is_space(ch)
}

/// A run is numeric when it leads with a digit, or a sign then a digit.
fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    /// Consume a maximal run of non-separator characters.
    fn run(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if is_separator(ch) {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, VauError> {
    let mut cur = Cursor {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();

    while let Some(ch) = cur.peek() {
        let span = cur.span();
        let token = match ch {
            '(' => {
                cur.bump();
                Token::LParen
            }
            ')' => {
                cur.bump();
                Token::RParen
            }
            '.' => {
                cur.bump();
                Token::Dot
            }
            ':' => {
                cur.bump();
                Token::Colon
            }
            ';' => {
                while cur.peek().is_some_and(|c| c != '\n') {
                    cur.bump();
                }
                continue;
            }
            c if is_space(c) => {
                while cur.peek().is_some_and(is_space) {
                    cur.bump();
                }
                Token::Space
            }
            '"' => Token::String(lex_string(&mut cur, span)?),
            '#' => match cur.run().as_str() {
                "#" => Token::Unit,
                "#t" => Token::Bool(true),
                "#f" => Token::Bool(false),
                other => {
                    return Err(VauError::syntax(
                        format!("unknown constant: {other}"),
                        span,
                    ))
                }
            },
            _ => {
                let text = cur.run();
                match text.parse::<f64>() {
                    Ok(n) if looks_numeric(&text) => Token::Number(n),
                    _ => Token::Symbol(text),
                }
            }
        };
        tokens.push(SpannedToken { token, span });
    }

    tracing::trace!(count = tokens.len(), "tokenized input");
    Ok(tokens)
}

fn lex_string(cur: &mut Cursor, span: Span) -> Result<String, VauError> {
    cur.bump(); // opening quote
    let mut s = String::new();
    loop {
        match cur.bump() {
            None => return Err(VauError::syntax("unterminated string", span)),
            Some('"') => return Ok(s),
            Some('\\') => match cur.bump() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('r') => s.push('\r'),
                Some('0') => s.push('\0'),
                Some('\\') => s.push('\\'),
                Some('"') => s.push('"'),
                Some(other) => {
                    s.push('\\');
                    s.push(other);
                }
                None => return Err(VauError::syntax("unterminated string", span)),
            },
            Some(ch) => s.push(ch),
        }
    }
}
