//! Expression evaluation.
//!
//! Bound [`Expression`](crate::ast::Expression) trees are evaluated against a
//! [`Memory`] with a set of [`EvaluationOptions`]. Evaluation is pure with
//! respect to memory: nothing here writes state.
//!
//! Failures never unwind. Every function body reports problems as an
//! [`EvalError`] naming the offending sub-expression, and the first failing
//! child aborts the call.

pub mod evaluator;
pub mod memory;
pub mod value;

use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::memory::MemoryError;

pub use evaluator::{evaluate, EvaluationOptions, ExpressionEvaluator};
pub use memory::{Memory, SimpleMemory, StackedMemory};
pub use value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0}")]
    ArityOrType(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("{0} does not have an evaluator, it's not a built-in function or a custom function.")]
    UnknownFunction(String),
    #[error("{0}")]
    Memory(#[from] MemoryError),
    #[error("{0}")]
    Evaluation(String),
}

/// Coarse classification of an error, for callers that branch on category
/// rather than message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ErrorKind {
    ArityOrType,
    OutOfRange,
    UnknownFunction,
    BadScope,
    ReadOnlyScope,
    Memory,
    Evaluation,
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::ArityOrType(_) => ErrorKind::ArityOrType,
            EvalError::OutOfRange(_) => ErrorKind::OutOfRange,
            EvalError::UnknownFunction(_) => ErrorKind::UnknownFunction,
            EvalError::Memory(MemoryError::BadScope { .. }) => ErrorKind::BadScope,
            EvalError::Memory(MemoryError::ReadOnlyScope { .. }) => ErrorKind::ReadOnlyScope,
            EvalError::Memory(_) => ErrorKind::Memory,
            EvalError::Evaluation(_) => ErrorKind::Evaluation,
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        EvalError::Evaluation(message.into())
    }

    pub fn arity_or_type(message: impl Into<String>) -> Self {
        EvalError::ArityOrType(message.into())
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        EvalError::OutOfRange(message.into())
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
