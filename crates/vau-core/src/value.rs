use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::{Rodeo, Spur};

use crate::error::VauError;
use crate::scope::Scope;

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// What a primitive hands back to the evaluator: either a finished value, or
/// an expression to evaluate in place of the call (a tail call).
pub enum Trampoline {
    Value(Value),
    Eval(Value, Scope),
}

/// A native body: receives the raw operand list and the caller's scope.
pub type NativeFnInner = dyn Fn(&Value, &Scope) -> Result<Trampoline, VauError>;

pub struct Primitive {
    pub name: String,
    pub func: Box<NativeFnInner>,
}

impl Primitive {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&Value, &Scope) -> Result<Trampoline, VauError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(f),
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<primitive {}>", self.name)
    }
}

/// A cons cell. `is_list` is fixed when the pair is built.
#[derive(Debug)]
pub struct Pair {
    first: Value,
    rest: Value,
    is_list: bool,
}

impl Pair {
    pub fn first(&self) -> &Value {
        &self.first
    }

    pub fn rest(&self) -> &Value {
        &self.rest
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }
}

fn take_pair(slot: &mut Value) -> Option<Rc<Pair>> {
    match std::mem::replace(slot, Value::Unit) {
        Value::Pair(cell) => Some(cell),
        other => {
            *slot = other;
            None
        }
    }
}

// Unlink nested cells through a worklist so dropping a deep structure, along
// either half of a pair, can't blow the stack.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending: Vec<Rc<Pair>> = Vec::new();
        pending.extend(take_pair(&mut self.first));
        pending.extend(take_pair(&mut self.rest));
        while let Some(cell) = pending.pop() {
            if let Ok(mut pair) = Rc::try_unwrap(cell) {
                pending.extend(take_pair(&mut pair.first));
                pending.extend(take_pair(&mut pair.rest));
            }
        }
    }
}

/// A procedure whose operands are evaluated before `body` sees them.
#[derive(Debug)]
pub struct Applicative {
    body: Value,
}

impl Applicative {
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// A user-defined fexpr built by `vau`.
#[derive(Debug)]
pub struct Operative {
    pub head: Value,
    pub tail: Value,
    pub lexical: Scope,
    pub dynamic: Value,
}

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Number(f64),
    String(Rc<String>),
    Symbol(Spur),
    Keyword(Spur),
    Pair(Rc<Pair>),
    Scope(Scope),
    Primitive(Rc<Primitive>),
    Applicative(Rc<Applicative>),
    Operative(Rc<Operative>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Pair(_) => "pair",
            Value::Scope(_) => "scope",
            Value::Primitive(_) => "primitive",
            Value::Applicative(_) => "applicative",
            Value::Operative(_) => "operative",
        }
    }

    pub fn symbol(s: &str) -> Value {
        Value::Symbol(intern(s))
    }

    pub fn keyword(s: &str) -> Value {
        Value::Keyword(intern(s))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::new(s.to_string()))
    }

    pub fn number(n: f64) -> Value {
        Value::Number(n)
    }

    pub fn pair(first: Value, rest: Value) -> Value {
        let is_list = match &rest {
            Value::Unit => true,
            Value::Pair(p) => p.is_list,
            _ => false,
        };
        Value::Pair(Rc::new(Pair {
            first,
            rest,
            is_list,
        }))
    }

    /// Build a proper list from `items`.
    pub fn list(items: Vec<Value>) -> Value {
        Value::list_with_tail(items, Value::Unit)
    }

    /// Build a list from `items` terminated by `tail` (improper unless `tail` is a list).
    pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Value {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::pair(item, acc))
    }

    pub fn primitive(
        name: impl Into<String>,
        f: impl Fn(&Value, &Scope) -> Result<Trampoline, VauError> + 'static,
    ) -> Value {
        Value::Primitive(Rc::new(Primitive::new(name, f)))
    }

    /// An applicative over a fresh primitive; the usual shape of a builtin.
    pub fn wrapped_primitive(
        name: impl Into<String>,
        f: impl Fn(&Value, &Scope) -> Result<Trampoline, VauError> + 'static,
    ) -> Value {
        Value::Applicative(Rc::new(Applicative {
            body: Value::primitive(name, f),
        }))
    }

    pub fn wrap(proc: Value) -> Result<Value, VauError> {
        if !proc.is_procedure() {
            return Err(VauError::type_error("procedure", proc.type_name()));
        }
        Ok(Value::Applicative(Rc::new(Applicative { body: proc })))
    }

    pub fn unwrap(&self) -> Result<Value, VauError> {
        match self {
            Value::Applicative(app) => Ok(app.body.clone()),
            other => Err(VauError::type_error("applicative", other.type_name())),
        }
    }

    pub fn vau(head: Value, tail: Value, lexical: Scope, dynamic: Value) -> Value {
        Value::Operative(Rc::new(Operative {
            head,
            tail,
            lexical,
            dynamic,
        }))
    }

    pub fn fst(&self) -> Result<Value, VauError> {
        match self {
            Value::Pair(p) => Ok(p.first.clone()),
            other => Err(VauError::type_error("pair", other.type_name())),
        }
    }

    pub fn snd(&self) -> Result<Value, VauError> {
        match self {
            Value::Pair(p) => Ok(p.rest.clone()),
            other => Err(VauError::type_error("pair", other.type_name())),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self, Value::Keyword(_))
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }

    /// True for Unit and for pairs whose spine ends in Unit.
    pub fn is_list(&self) -> bool {
        match self {
            Value::Unit => true,
            Value::Pair(p) => p.is_list,
            _ => false,
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, Value::Scope(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Value::Primitive(_) | Value::Applicative(_) | Value::Operative(_)
        )
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Primitive(_))
    }

    pub fn is_applicative(&self) -> bool {
        matches!(self, Value::Applicative(_))
    }

    pub fn is_operative(&self) -> bool {
        matches!(self, Value::Operative(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<String> {
        match self {
            Value::Symbol(s) => Some(resolve(*s)),
            _ => None,
        }
    }

    pub fn as_symbol_spur(&self) -> Option<Spur> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<String> {
        match self {
            Value::Keyword(s) => Some(resolve(*s)),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Rc<Pair>> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_scope(&self) -> Option<&Scope> {
        match self {
            Value::Scope(s) => Some(s),
            _ => None,
        }
    }

    /// Collect the elements of a proper list.
    pub fn list_to_vec(&self) -> Result<Vec<Value>, VauError> {
        let mut items = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Value::Unit => return Ok(items),
                Value::Pair(p) if p.is_list => {
                    items.push(p.first.clone());
                    cursor = &p.rest;
                }
                other => return Err(VauError::type_error("list", other.type_name())),
            }
        }
    }

    /// Reference identity: same allocation for heap values, equal payload otherwise.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Scope(a), Value::Scope(b)) => a.ptr_eq(b),
            (Value::Primitive(a), Value::Primitive(b)) => Rc::ptr_eq(a, b),
            (Value::Applicative(a), Value::Applicative(b)) => Rc::ptr_eq(a, b),
            (Value::Operative(a), Value::Operative(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }
}

// Structural for data, identity for scopes and procedures.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            let same = match (a, b) {
                (Value::Unit, Value::Unit) => true,
                (Value::Bool(x), Value::Bool(y)) => x == y,
                (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
                (Value::String(x), Value::String(y)) => x == y,
                (Value::Symbol(x), Value::Symbol(y)) => x == y,
                (Value::Keyword(x), Value::Keyword(y)) => x == y,
                (Value::Pair(x), Value::Pair(y)) => {
                    if !Rc::ptr_eq(x, y) {
                        pending.push((&x.rest, &y.rest));
                        pending.push((&x.first, &y.first));
                    }
                    x.is_list == y.is_list
                }
                (Value::Scope(x), Value::Scope(y)) => x.ptr_eq(y),
                (Value::Primitive(x), Value::Primitive(y)) => Rc::ptr_eq(x, y),
                (Value::Applicative(x), Value::Applicative(y)) => Rc::ptr_eq(x, y),
                (Value::Operative(x), Value::Operative(y)) => Rc::ptr_eq(x, y),
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\0' => write!(f, "\\0")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

/// Printer work item: a value still to render, or literal punctuation.
enum Piece<'a> {
    Item(&'a Value),
    Text(&'static str),
}

// Non-finite numbers print as the host renders them (`NaN`, `inf`, `-inf`).
// There is no literal syntax for them, so they read back as symbols.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Piece::Item(self)];
        while let Some(piece) = pending.pop() {
            let value = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Item(value) => value,
            };
            match value {
                Value::Unit => write!(f, "#")?,
                Value::Bool(true) => write!(f, "#t")?,
                Value::Bool(false) => write!(f, "#f")?,
                Value::Number(n) => write!(f, "{n}")?,
                Value::String(s) => write_string_literal(f, s)?,
                Value::Symbol(s) => with_resolved(*s, |name| write!(f, "{name}"))?,
                Value::Keyword(s) => with_resolved(*s, |name| write!(f, ":{name}"))?,
                Value::Pair(p) if p.is_list => {
                    let mut items = Vec::new();
                    let mut cursor = value;
                    while let Value::Pair(cell) = cursor {
                        items.push(&cell.first);
                        cursor = &cell.rest;
                    }
                    pending.push(Piece::Text(")"));
                    for (i, item) in items.into_iter().enumerate().rev() {
                        pending.push(Piece::Item(item));
                        if i > 0 {
                            pending.push(Piece::Text(" "));
                        }
                    }
                    pending.push(Piece::Text("("));
                }
                Value::Pair(p) => {
                    pending.push(Piece::Text(")"));
                    pending.push(Piece::Item(&p.rest));
                    pending.push(Piece::Text(" . "));
                    pending.push(Piece::Item(&p.first));
                    pending.push(Piece::Text("("));
                }
                Value::Scope(_) => write!(f, "<scope>")?,
                Value::Primitive(p) => write!(f, "<primitive {}>", p.name)?,
                Value::Applicative(_) => write!(f, "<applicative>")?,
                Value::Operative(_) => write!(f, "<operative>")?,
            }
        }
        Ok(())
    }
}

/// Render a value back to source-like text.
pub fn show(value: &Value) -> String {
    value.to_string()
}
