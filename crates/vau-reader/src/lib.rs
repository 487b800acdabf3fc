pub mod lexer;
mod reader;

pub use reader::read;
pub use reader::read_one;
