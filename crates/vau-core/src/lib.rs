pub mod error;
pub mod scope;
pub mod value;

pub use error::{suggest_similar, Span, VauError};
pub use lasso::Spur;
pub use scope::Scope;
pub use value::{
    intern, resolve, show, with_resolved, Applicative, NativeFnInner, Operative, Pair, Primitive,
    Trampoline, Value,
};
