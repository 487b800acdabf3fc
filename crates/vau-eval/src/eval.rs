use std::cell::Cell;

use vau_core::{Scope, Trampoline, VauError, Value};

use crate::bootstrap;

pub type EvalResult = Result<Value, VauError>;

/// Knobs an embedder can set on evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalOptions {
    /// Abort with `VauError::StepLimit` after this many machine steps (0 = unlimited).
    pub step_limit: usize,
}

/// The rest of the computation, one pending step per frame.
enum Frame {
    /// The operator is being evaluated; apply it to `operands` from `scope`.
    Combine { operands: Value, scope: Scope },
    /// An operand is being evaluated. `then` is the procedure that receives
    /// the finished argument list, if any.
    Evlis {
        done: Vec<Value>,
        pending: Value,
        scope: Scope,
        then: Option<Value>,
    },
    /// A body form is being evaluated and `rest` still has to run.
    Sequence { rest: Value, scope: Scope },
    /// The remaining body produced a value; use this one instead if that was `#`.
    Fallback(Value),
}

enum Control {
    Eval(Value, Scope),
    Apply(Value, Value, Scope),
    Exec(Value, Scope),
    Evlis(Value, Scope, Option<Value>),
    Return(Value),
}

/// Drives a single top-level evaluation. Continuations live on `stack`, so
/// the native stack stays flat no matter how deep the program recurses.
struct Machine {
    stack: Vec<Frame>,
    steps: usize,
    /// Deepest the continuation stack has been.
    peak: usize,
    options: EvalOptions,
}

impl Machine {
    fn new(options: EvalOptions) -> Self {
        Machine {
            stack: Vec::new(),
            steps: 0,
            peak: 0,
            options,
        }
    }

    fn run(&mut self, mut control: Control) -> EvalResult {
        loop {
            self.tick()?;
            self.peak = self.peak.max(self.stack.len());
            control = match control {
                Control::Eval(expr, scope) => self.eval(expr, scope)?,
                Control::Apply(proc, operands, scope) => self.apply(proc, operands, scope)?,
                Control::Exec(forms, scope) => self.exec(forms, scope)?,
                Control::Evlis(list, scope, then) => self.evlis(Vec::new(), list, scope, then)?,
                Control::Return(value) => match self.stack.pop() {
                    None => return Ok(value),
                    Some(frame) => self.resume(frame, value)?,
                },
            };
        }
    }

    fn tick(&mut self) -> Result<(), VauError> {
        self.steps += 1;
        let limit = self.options.step_limit;
        if limit > 0 && self.steps > limit {
            return Err(VauError::StepLimit(limit));
        }
        Ok(())
    }

    fn eval(&mut self, expr: Value, scope: Scope) -> Result<Control, VauError> {
        match &expr {
            Value::Symbol(_) => Ok(Control::Return(scope.get(&expr)?)),
            Value::Pair(p) => {
                // The operator is always evaluated; the callee decides about operands.
                self.stack.push(Frame::Combine {
                    operands: p.rest().clone(),
                    scope: scope.clone(),
                });
                Ok(Control::Eval(p.first().clone(), scope))
            }
            _ => Ok(Control::Return(expr)),
        }
    }

    fn apply(&mut self, proc: Value, operands: Value, caller: Scope) -> Result<Control, VauError> {
        match &proc {
            Value::Primitive(prim) => {
                tracing::trace!(name = %prim.name, "primitive");
                match (prim.func)(&operands, &caller)? {
                    Trampoline::Value(v) => Ok(Control::Return(v)),
                    Trampoline::Eval(expr, scope) => Ok(Control::Eval(expr, scope)),
                }
            }
            Value::Applicative(app) => Ok(Control::Evlis(
                operands,
                caller,
                Some(app.body().clone()),
            )),
            Value::Operative(op) => {
                tracing::trace!(operands = %operands, "operative");
                let local = Scope::child(&op.lexical);
                local.bind(&op.head, &operands)?;
                local.set(&op.dynamic, Value::Scope(caller))?;
                Ok(Control::Exec(op.tail.clone(), local))
            }
            other => Err(VauError::type_error(
                "procedure",
                format!("{other} ({})", other.type_name()),
            )),
        }
    }

    /// Evaluate the operands in `pending` left to right after those in `done`.
    fn evlis(
        &mut self,
        done: Vec<Value>,
        pending: Value,
        scope: Scope,
        then: Option<Value>,
    ) -> Result<Control, VauError> {
        match &pending {
            Value::Unit => {
                let args = Value::list(done);
                Ok(match then {
                    Some(proc) => Control::Apply(proc, args, scope),
                    None => Control::Return(args),
                })
            }
            Value::Pair(p) => {
                let next = p.first().clone();
                self.stack.push(Frame::Evlis {
                    done,
                    pending: p.rest().clone(),
                    scope: scope.clone(),
                    then,
                });
                Ok(Control::Eval(next, scope))
            }
            other => Err(VauError::type_error("operand list", other.type_name())),
        }
    }

    /// Run a body. Its value is the last form that did not produce `#`.
    fn exec(&mut self, forms: Value, scope: Scope) -> Result<Control, VauError> {
        match &forms {
            Value::Unit => Ok(Control::Return(Value::Unit)),
            Value::Pair(p) => {
                // last form runs in tail position
                if !p.rest().is_unit() {
                    self.stack.push(Frame::Sequence {
                        rest: p.rest().clone(),
                        scope: scope.clone(),
                    });
                }
                Ok(Control::Eval(p.first().clone(), scope))
            }
            other => Err(VauError::type_error("body list", other.type_name())),
        }
    }

    fn resume(&mut self, frame: Frame, value: Value) -> Result<Control, VauError> {
        match frame {
            Frame::Combine { operands, scope } => Ok(Control::Apply(value, operands, scope)),
            Frame::Evlis {
                mut done,
                pending,
                scope,
                then,
            } => {
                done.push(value);
                self.evlis(done, pending, scope, then)
            }
            Frame::Sequence { rest, scope } => {
                self.push_fallback(value);
                Ok(Control::Exec(rest, scope))
            }
            Frame::Fallback(earlier) => Ok(Control::Return(if value.is_unit() {
                earlier
            } else {
                value
            })),
        }
    }

    /// A `#` fallback is the identity, and a newer non-`#` fallback always
    /// wins over the one beneath it, so neither needs a frame of its own.
    fn push_fallback(&mut self, value: Value) {
        if value.is_unit() {
            return;
        }
        match self.stack.last_mut() {
            Some(Frame::Fallback(earlier)) => *earlier = value,
            _ => self.stack.push(Frame::Fallback(value)),
        }
    }
}

fn run(control: Control, options: EvalOptions) -> EvalResult {
    let mut machine = Machine::new(options);
    let result = machine.run(control);
    match &result {
        Ok(value) => tracing::debug!(
            steps = machine.steps,
            peak_depth = machine.peak,
            result = %value,
            "evaluated"
        ),
        Err(e) => tracing::debug!(
            steps = machine.steps,
            peak_depth = machine.peak,
            error = %e,
            "evaluation failed"
        ),
    }
    result
}

/// Evaluate `expr` in `scope`.
pub fn eval(expr: &Value, scope: &Scope) -> EvalResult {
    eval_with(expr, scope, EvalOptions::default())
}

pub fn eval_with(expr: &Value, scope: &Scope, options: EvalOptions) -> EvalResult {
    run(Control::Eval(expr.clone(), scope.clone()), options)
}

/// Apply `proc` to `operands` as if called from `scope`. Operands are passed
/// as written; an applicative evaluates them in `scope` first.
pub fn apply(proc: &Value, operands: &Value, scope: &Scope) -> EvalResult {
    run(
        Control::Apply(proc.clone(), operands.clone(), scope.clone()),
        EvalOptions::default(),
    )
}

/// Run a list of body forms in `scope`.
pub fn exec(forms: &Value, scope: &Scope) -> EvalResult {
    run(
        Control::Exec(forms.clone(), scope.clone()),
        EvalOptions::default(),
    )
}

/// Evaluate every element of an operand list, returning the list of results.
pub fn evlis(list: &Value, scope: &Scope) -> EvalResult {
    run(
        Control::Evlis(list.clone(), scope.clone(), None),
        EvalOptions::default(),
    )
}

/// Evaluate every form in `input` in `scope`, returning the last result.
pub fn eval_string(input: &str, scope: &Scope) -> EvalResult {
    let mut result = Value::Unit;
    for expr in vau_reader::read(input)? {
        result = eval(&expr, scope)?;
    }
    Ok(result)
}

/// A session: a bootstrapped top-level scope plus evaluation options.
pub struct Interpreter {
    pub root: Scope,
    pub options: EvalOptions,
    next_result: Cell<usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(EvalOptions::default())
    }

    pub fn with_options(options: EvalOptions) -> Self {
        Interpreter {
            root: bootstrap::init(),
            options,
            next_result: Cell::new(0),
        }
    }

    pub fn eval(&self, expr: &Value) -> EvalResult {
        eval_with(expr, &self.root, self.options)
    }

    /// Evaluate every form in `input` in order, one result per form. Stops at
    /// the first error.
    pub fn eval_str(&self, input: &str) -> Result<Vec<Value>, VauError> {
        vau_reader::read(input)?
            .iter()
            .map(|expr| self.eval(expr))
            .collect()
    }

    /// Bind `value` under the next free `$N` name in the top scope.
    pub fn bind_result(&self, value: Value) -> String {
        let n = self.next_result.get();
        self.next_result.set(n + 1);
        let name = format!("${n}");
        self.root.set_str(&name, value);
        name
    }
}
