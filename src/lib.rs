//! # Parley: an expression-driven dialog engine
//!
//! Parley runs multi-turn conversations. A conversation is a stack of
//! dialogs whose state lives in scoped memory, and whose behavior is steered
//! by a small expression language evaluated against that memory.
//!
//! ## Expression Pipeline
//!
//! ```text
//! Text → Tokenizer → Parser → Binder → Expression → Evaluator
//! ```
//!
//! - [`tokenizer`] turns expression text into tokens, including string
//!   templates with `${...}` interpolation.
//! - [`analyzer`] is a token-level parser combinator library. It builds the
//!   syntax tree and binds every call against a [`functions::FunctionTable`],
//!   so unknown functions and arity mistakes are caught before evaluation.
//! - [`ast`] holds the bound [`ast::Expression`] tree.
//! - [`eval`] evaluates expressions against any [`eval::Memory`] and caches
//!   parsed text.
//! - [`functions`] is the built-in library: operators, strings, math,
//!   collections, lambdas, objects and date/time.
//!
//! ## Memory
//!
//! [`memory`] maps dotted paths such as `user.name`, `$count` or
//! `@city` onto named scopes (`user`, `conversation`, `turn`, `dialog`,
//! `this`, `class`, `settings`). Shorthand prefixes are expanded by path
//! resolvers before the scope is looked up.
//!
//! ## Dialogs and Turns
//!
//! - [`dialogs`] contains the [`dialogs::Dialog`] trait, the dialog stack
//!   ([`dialogs::DialogContext`]), waterfalls, prompts, declarative actions
//!   and the [`dialogs::DialogManager`] that runs whole turns.
//! - [`turn`] models activities, the channel adapter and the interceptor
//!   chains around sending, updating and deleting activities.
//! - [`storage`] persists state between turns with e-tag concurrency.
//! - [`recognizer`] attaches intents and entities to incoming messages.
//! - [`config`] loads [`config::EngineConfig`].

pub mod analyzer;
pub mod ast;
pub mod config;
pub mod dialogs;
pub mod error;
pub mod eval;
pub mod functions;
pub mod memory;
pub mod recognizer;
pub mod storage;
pub mod tokenizer;
pub mod turn;

// Re-exports
pub use config::EngineConfig;
pub use dialogs::{Dialog, DialogContext, DialogManager};
pub use error::*;
pub use eval::{ExpressionEvaluator, Memory, SimpleMemory, Value};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
