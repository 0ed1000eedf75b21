//! Turn-level plumbing: activities, channel adapters, and the per-turn
//! context with its send/update/delete interceptor chains.

pub mod activity;
pub mod adapter;
pub mod context;
pub mod interceptor;

use thiserror::Error;

pub use activity::{Activity, ActivityType, ChannelAccount, ConversationReference, ResourceResponse};
pub use adapter::{BufferedAdapter, ChannelAdapter};
pub use context::TurnContext;
pub use interceptor::{
    DeleteInterceptor, Interceptor, Next, SendInterceptor, Terminal, UpdateInterceptor,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error("Adapter error: {0}")]
    Adapter(String),
    #[error("activity '{id}' was not found")]
    NotFound { id: String },
    #[error("activity has no id")]
    MissingId,
    #[error("Interceptor error: {0}")]
    Interceptor(String),
}

pub type TurnResult<T> = Result<T, TurnError>;
