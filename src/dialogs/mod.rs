//! The dialog stack machine.
//!
//! A [`DialogContext`] owns the stack of running [`DialogInstance`]s for one
//! conversation turn. Dialogs are looked up by id in a [`DialogSet`] and
//! driven through `begin`/`continue`/`resume`/`reprompt`/`end`. Every
//! transition recomputes its [`DialogTurnResult`] from the stack depth after
//! the transition, whatever the dialog itself returned.

pub mod actions;
pub mod dialog;
pub mod dialog_context;
pub mod dialog_set;
pub mod manager;
pub mod prompts;
pub mod waterfall;

use thiserror::Error;

use crate::analyzer::ExpressionError;
use crate::eval::EvalError;
use crate::memory::MemoryError;
use crate::recognizer::RecognizerError;
use crate::storage::StorageError;
use crate::turn::TurnError;

pub use actions::{
    ActionSequence, BeginDialog, DeleteProperty, EndDialog, IfCondition, SendActivity, SetProperty,
};
pub use dialog::{Dialog, DialogInstance, DialogReason, DialogState, DialogTurnResult};
pub use dialog_context::DialogContext;
pub use dialog_set::DialogSet;
pub use manager::DialogManager;
pub use prompts::{NumberPrompt, Prompt, PromptInput, PromptValidator, TextPrompt};
pub use waterfall::{waterfall_step, WaterfallDialog, WaterfallStep, WaterfallStepFn};

#[derive(Error, Debug)]
pub enum DialogError {
    #[error("dialog '{id}' was not found in the dialog set")]
    NotFound { id: String },
    #[error("a different dialog with id '{id}' is already registered")]
    DuplicateId { id: String },
    #[error("dialog stack is limited to {max} dialogs")]
    StackOverflow { max: usize },
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("storage operation timed out")]
    Timeout,
}

impl DialogError {
    /// Fatal errors abort the turn without persisting anything. The rest are
    /// reported to the user and the conversation starts over.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DialogError::NotFound { .. }
                | DialogError::DuplicateId { .. }
                | DialogError::StackOverflow { .. }
                | DialogError::Turn(_)
                | DialogError::Storage(_)
                | DialogError::Serialization(_)
                | DialogError::Timeout
        )
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        DialogError::NotFound { id: id.into() }
    }
}

pub type DialogResult<T> = Result<T, DialogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DialogError::not_found("x").is_fatal());
        assert!(DialogError::StackOverflow { max: 1 }.is_fatal());
        assert!(DialogError::Storage(StorageError::ETagConflict { key: "k".into() }).is_fatal());
        assert!(!DialogError::Eval(EvalError::arity_or_type("bad")).is_fatal());
        assert!(!DialogError::Memory(MemoryError::ReadOnlyScope {
            scope: "settings".into()
        })
        .is_fatal());
        assert_eq!(
            DialogError::not_found("menu").to_string(),
            "dialog 'menu' was not found in the dialog set"
        );
    }
}
