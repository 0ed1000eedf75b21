use thiserror::Error;

use crate::analyzer::{ExpressionError, ParseError};
use crate::dialogs::DialogError;
use crate::eval::EvalError;
use crate::memory::MemoryError;
use crate::recognizer::RecognizerError;
use crate::storage::StorageError;
use crate::tokenizer::TokenizerError;
use crate::turn::TurnError;

#[derive(Error, Debug)]
pub enum Error {
    // expressions
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // dialogs and turns
    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
