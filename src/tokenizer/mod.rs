//! Lexical analysis of expression source text, built on nom.
//!
//! The tokenizer produces [`TokenSpan`]s with byte offsets and 1-based
//! line/column positions. Whitespace is kept as tokens; the analyzer strips
//! it before parsing.

pub mod literal;
pub mod symbol;
pub mod token;
pub mod whitespace;

pub use literal::{Literal, StringPart};
pub use symbol::{Delimiter, Operator};
pub use token::{Span, Token, TokenSpan, Tokenizer, TokenizerError, TokenizerResult};
