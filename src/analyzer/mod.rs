pub mod binder;
pub mod combinators;
pub mod core;
pub mod parsers;
pub mod prelude;

pub use binder::{parse_source, ExpressionError, ExpressionParser, ExpressionResult};
pub use core::ParseError;
pub use core::ParseResult;
pub use core::Parser;
