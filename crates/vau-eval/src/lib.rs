pub mod bootstrap;
pub mod eval;

pub use bootstrap::init;
pub use eval::{
    apply, eval, eval_string, eval_with, evlis, exec, EvalOptions, EvalResult, Interpreter,
};
