//! Named memory scopes and the path-addressed state manager built on them.
//!
//! A path such as `user.profile.name` is split at the first dot: the head
//! selects a [`MemoryScope`], the tail is navigated inside that scope's root.
//! Short-hand prefixes (`$`, `#`, `@`, `@@`, `%`) are rewritten to full paths
//! by [`PathResolver`]s before the split happens.

pub mod object_path;
pub mod path_resolver;
pub mod registry;
pub mod scopes;
pub mod state_manager;

use thiserror::Error;

pub use path_resolver::{AliasPathResolver, PathResolver};
pub use registry::ScopeRegistry;
pub use scopes::{
    ClassMemoryScope, DialogMemoryScope, MemoryScope, RootMemoryScope, SettingsMemoryScope,
    ThisMemoryScope,
};
pub use state_manager::{DialogMemory, DialogStateManager, StateValue};

pub const USER: &str = "user";
pub const CONVERSATION: &str = "conversation";
pub const TURN: &str = "turn";
pub const DIALOG: &str = "dialog";
pub const THIS: &str = "this";
pub const CLASS: &str = "class";
pub const SETTINGS: &str = "settings";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("'{path}' does not match memory scopes: {scopes}")]
    BadScope { path: String, scopes: String },
    #[error("memory scope '{scope}' is read-only")]
    ReadOnlyScope { scope: String },
    #[error("memory scope '{scope}' is not available: {message}")]
    Unavailable { scope: String, message: String },
    #[error("{path} = an unresolved asynchronous value cannot be stored")]
    UnresolvedValue { path: String },
    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },
    #[error("the root of memory scope '{scope}' cannot be removed")]
    ScopeRootRemoval { scope: String },
    #[error("memory scope '{name}' is already registered")]
    DuplicateScope { name: String },
}

pub type MemoryResult<T> = Result<T, MemoryError>;
