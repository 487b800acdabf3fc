use vau_core::{show, Scope, Trampoline, VauError, Value};

/// Split a proper operand list of exactly `N` elements.
fn exact_args<const N: usize>(name: &str, operands: &Value) -> Result<[Value; N], VauError> {
    let mut items = Vec::with_capacity(N);
    let mut cursor = operands;
    while let Value::Pair(p) = cursor {
        items.push(p.first().clone());
        cursor = p.rest();
    }
    if !cursor.is_unit() || items.len() != N {
        return Err(VauError::arity(name, N.to_string(), items.len()));
    }
    let got = items.len();
    items
        .try_into()
        .map_err(|_| VauError::arity(name, N.to_string(), got))
}

fn register_app1(
    scope: &Scope,
    name: &'static str,
    f: impl Fn(Value) -> Result<Value, VauError> + 'static,
) {
    let app = Value::wrapped_primitive(name, move |operands, _| {
        let [x] = exact_args::<1>(name, operands)?;
        Ok(Trampoline::Value(f(x)?))
    });
    scope.set_str(name, app);
}

fn register_app2(
    scope: &Scope,
    name: &'static str,
    f: impl Fn(Value, Value) -> Result<Value, VauError> + 'static,
) {
    let app = Value::wrapped_primitive(name, move |operands, _| {
        let [x, y] = exact_args::<2>(name, operands)?;
        Ok(Trampoline::Value(f(x, y)?))
    });
    scope.set_str(name, app);
}

/// A fresh top-level scope holding the builtins.
pub fn init() -> Scope {
    let scope = Scope::new();
    register(&scope);
    scope
}

pub fn register(scope: &Scope) {
    register_app2(scope, "pair", |a, b| Ok(Value::pair(a, b)));
    register_app1(scope, "fst", |v| v.fst());
    register_app1(scope, "snd", |v| v.snd());
    register_app1(scope, "wrap", Value::wrap);
    register_app1(scope, "unwrap", |v| v.unwrap());
    register_app1(scope, "show", |v| Ok(Value::string(&show(&v))));

    // (eval expr scope): the expression is evaluated in tail position.
    scope.set_str(
        "eval",
        Value::wrapped_primitive("eval", |operands, _| {
            let [expr, target] = exact_args::<2>("eval", operands)?;
            match target {
                Value::Scope(s) => Ok(Trampoline::Eval(expr, s)),
                other => Err(VauError::type_error("scope", other.type_name())),
            }
        }),
    );

    // (vau head dynamic . body) is itself an operative: nothing is evaluated.
    scope.set_str(
        "vau",
        Value::primitive("vau", |operands, caller| {
            let (head, rest) = match operands {
                Value::Pair(p) => (p.first().clone(), p.rest()),
                _ => return Err(VauError::arity("vau", "at least 2", 0)),
            };
            let (dynamic, body) = match rest {
                Value::Pair(p) => (p.first().clone(), p.rest().clone()),
                _ => return Err(VauError::arity("vau", "at least 2", 1)),
            };
            if !matches!(dynamic, Value::Unit | Value::Symbol(_) | Value::String(_)) {
                return Err(VauError::type_error(
                    "symbol or # for the dynamic scope name",
                    dynamic.type_name(),
                ));
            }
            Ok(Trampoline::Value(Value::vau(
                head,
                body,
                caller.clone(),
                dynamic,
            )))
        }),
    );
}
