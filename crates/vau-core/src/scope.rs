use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap as SpurMap;
use lasso::Spur;

use crate::error::{suggest_similar, VauError};
use crate::value::{intern, resolve, Value};

/// An environment frame: local bindings plus a link to the enclosing scope.
///
/// Cloning a `Scope` shares the frame, so a clone held by an operative sees
/// every later `set` on the original.
#[derive(Clone)]
pub struct Scope {
    frame: Rc<RefCell<SpurMap<Spur, Value>>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            frame: Rc::new(RefCell::new(SpurMap::new())),
            parent: None,
        }
    }

    pub fn child(parent: &Scope) -> Self {
        Scope {
            frame: Rc::new(RefCell::new(SpurMap::new())),
            parent: Some(Rc::new(parent.clone())),
        }
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.parent.as_deref()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }

    /// Look `key` up here, then along the parent chain.
    ///
    /// A miss is `VauError::Unbound`, wrapped in `VauError::WithContext` when a
    /// similar visible name can be suggested. Match on `err.inner()` to see the
    /// `Unbound` in both cases.
    pub fn get(&self, key: &Value) -> Result<Value, VauError> {
        let name = match key {
            Value::Symbol(s) => *s,
            Value::String(s) => intern(s),
            other => return Err(VauError::type_error("symbol or string key", other.type_name())),
        };
        self.lookup(name).ok_or_else(|| {
            let name = resolve(name);
            match suggest_similar(&name, &self.visible_names()) {
                Some(close) => {
                    VauError::unbound(name).with_hint(format!("did you mean '{close}'?"))
                }
                None => VauError::unbound(name),
            }
        })
    }

    pub fn get_str(&self, name: &str) -> Result<Value, VauError> {
        self.get(&Value::symbol(name))
    }

    pub fn lookup(&self, name: Spur) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(val) = scope.frame.borrow().get(&name) {
                return Some(val.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Bind `key` in this frame only. A Unit key discards the value.
    pub fn set(&self, key: &Value, value: Value) -> Result<(), VauError> {
        let name = match key {
            Value::Unit => return Ok(()),
            Value::Symbol(s) => *s,
            Value::String(s) => intern(s),
            other => return Err(VauError::type_error("symbol or string key", other.type_name())),
        };
        self.frame.borrow_mut().insert(name, value);
        Ok(())
    }

    pub fn set_str(&self, name: &str, value: Value) {
        self.frame.borrow_mut().insert(intern(name), value);
    }

    /// Destructure `value` against `pattern`.
    ///
    /// `#` matches anything and binds nothing, a symbol takes the whole value,
    /// and a pair pattern descends into both halves. `(a b . rest)` therefore
    /// binds two operands and the remaining list.
    pub fn bind(&self, pattern: &Value, value: &Value) -> Result<(), VauError> {
        let mut pending = vec![(pattern, value)];
        while let Some((pattern, value)) = pending.pop() {
            match pattern {
                Value::Unit => {}
                Value::Symbol(_) => self.set(pattern, value.clone())?,
                Value::Pair(pat) => {
                    let Value::Pair(val) = value else {
                        return Err(VauError::type_error(
                            format!("pair to match {pattern}"),
                            value.type_name(),
                        ));
                    };
                    pending.push((pat.rest(), val.rest()));
                    pending.push((pat.first(), val.first()));
                }
                other => {
                    return Err(VauError::type_error(
                        "symbol, pair or # in binding pattern",
                        other.type_name(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Names bound in this frame, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.frame.borrow().keys().map(|k| resolve(*k)).collect();
        names.sort();
        names
    }

    /// Every name reachable from this scope, nearest frame first.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut scope = Some(self);
        while let Some(s) = scope {
            names.extend(s.names());
            scope = s.parent();
        }
        names
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

// Frames can contain themselves (a scope bound as a value), so never recurse.
impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<scope {} bindings>", self.frame.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_get_walks_parent_chain() {
        let root = Scope::new();
        root.set_str("x", num(1.0));
        let mid = Scope::child(&root);
        let leaf = Scope::child(&mid);
        assert_eq!(leaf.get_str("x").unwrap(), num(1.0));
        assert_eq!(leaf.get(&Value::string("x")).unwrap(), num(1.0));
    }

    #[test]
    fn test_get_unbound() {
        let root = Scope::new();
        let err = root.get_str("nope").unwrap_err();
        assert!(matches!(err.inner(), VauError::Unbound(name) if name == "nope"));
    }

    #[test]
    fn test_unbound_suggests_close_name() {
        let root = Scope::new();
        root.set_str("unwrap", Value::Unit);
        let err = Scope::child(&root).get_str("unwrpa").unwrap_err();
        assert_eq!(err.hint(), Some("did you mean 'unwrap'?"));
        assert!(matches!(err, VauError::WithContext { .. }));
        assert!(matches!(err.inner(), VauError::Unbound(name) if name == "unwrpa"));
    }

    #[test]
    fn test_unbound_without_suggestion_is_bare() {
        let root = Scope::new();
        root.set_str("pair", Value::Unit);
        let err = root.get_str("zzzzzz").unwrap_err();
        assert!(err.hint().is_none());
        assert!(matches!(err, VauError::Unbound(_)));
    }

    #[test]
    fn test_bind_deeply_nested_pattern() {
        let depth = 100_000;
        let nest = |leaf: Value| (0..depth).fold(leaf, |inner, _| Value::pair(inner, Value::Unit));
        let s = Scope::new();
        s.bind(&nest(Value::symbol("deep")), &nest(num(7.0))).unwrap();
        assert_eq!(s.get_str("deep").unwrap(), num(7.0));
    }

    #[test]
    fn test_child_set_shadows_without_touching_parent() {
        let parent = Scope::new();
        parent.set_str("k", num(0.0));
        let child = Scope::child(&parent);
        child.set(&Value::symbol("k"), num(1.0)).unwrap();
        assert_eq!(child.get_str("k").unwrap(), num(1.0));
        assert_eq!(parent.get_str("k").unwrap(), num(0.0));

        child.set(&Value::symbol("only"), num(2.0)).unwrap();
        assert!(parent.get_str("only").is_err());
    }

    #[test]
    fn test_set_unit_key_is_noop() {
        let s = Scope::new();
        s.set(&Value::Unit, num(1.0)).unwrap();
        assert!(s.names().is_empty());
    }

    #[test]
    fn test_set_rejects_other_keys() {
        let s = Scope::new();
        assert!(matches!(
            s.set(&num(1.0), Value::Unit),
            Err(VauError::Type { .. })
        ));
        assert!(matches!(s.get(&Value::Unit), Err(VauError::Type { .. })));
    }

    #[test]
    fn test_symbol_and_string_keys_share_a_binding() {
        let s = Scope::new();
        s.set(&Value::string("a"), num(1.0)).unwrap();
        assert_eq!(s.get(&Value::symbol("a")).unwrap(), num(1.0));
    }

    #[test]
    fn test_bind_fixed_arity() {
        let s = Scope::new();
        let pattern = Value::list(vec![Value::symbol("a"), Value::symbol("b")]);
        s.bind(&pattern, &Value::list(vec![num(1.0), num(2.0)])).unwrap();
        assert_eq!(s.get_str("a").unwrap(), num(1.0));
        assert_eq!(s.get_str("b").unwrap(), num(2.0));
    }

    #[test]
    fn test_bind_dotted_rest() {
        let s = Scope::new();
        let pattern = Value::list_with_tail(vec![Value::symbol("a")], Value::symbol("rest"));
        s.bind(&pattern, &Value::list(vec![num(1.0), num(2.0), num(3.0)]))
            .unwrap();
        assert_eq!(s.get_str("a").unwrap(), num(1.0));
        assert_eq!(
            s.get_str("rest").unwrap(),
            Value::list(vec![num(2.0), num(3.0)])
        );
    }

    #[test]
    fn test_bind_symbol_takes_whole_list() {
        let s = Scope::new();
        let args = Value::list(vec![num(1.0), num(2.0)]);
        s.bind(&Value::symbol("args"), &args).unwrap();
        assert_eq!(s.get_str("args").unwrap(), args);
    }

    #[test]
    fn test_bind_unit_wildcard_ignores_extra() {
        let s = Scope::new();
        let pattern = Value::list(vec![Value::symbol("a"), Value::Unit]);
        s.bind(
            &pattern,
            &Value::list(vec![num(1.0), num(2.0), num(3.0)]),
        )
        .unwrap();
        assert_eq!(s.names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_bind_nested_pattern() {
        let s = Scope::new();
        let pattern = Value::list(vec![
            Value::pair(Value::symbol("x"), Value::symbol("y")),
            Value::symbol("z"),
        ]);
        let value = Value::list(vec![Value::pair(num(1.0), num(2.0)), num(3.0)]);
        s.bind(&pattern, &value).unwrap();
        assert_eq!(s.get_str("x").unwrap(), num(1.0));
        assert_eq!(s.get_str("y").unwrap(), num(2.0));
        assert_eq!(s.get_str("z").unwrap(), num(3.0));
    }

    #[test]
    fn test_bind_too_few_values() {
        let s = Scope::new();
        let pattern = Value::list(vec![Value::symbol("a"), Value::symbol("b")]);
        let err = s.bind(&pattern, &Value::list(vec![num(1.0)])).unwrap_err();
        assert!(matches!(err, VauError::Type { .. }));
    }

    #[test]
    fn test_bind_rejects_literal_pattern() {
        let s = Scope::new();
        assert!(s.bind(&Value::Bool(true), &Value::Unit).is_err());
    }

    #[test]
    fn test_scope_can_hold_itself() {
        let s = Scope::new();
        s.set_str("me", Value::Scope(s.clone()));
        let me = s.get_str("me").unwrap();
        assert!(me.as_scope().unwrap().ptr_eq(&s));
        assert_eq!(format!("{s:?}"), "<scope 1 bindings>");
    }
}
