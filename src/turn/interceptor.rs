//! Middleware chain for outgoing send/update/delete operations.
//!
//! Interceptors run outermost first. Each one gets a [`Next`] handle and
//! either calls [`Next::run`] to pass the payload on, or returns without
//! calling it, in which case later interceptors and the terminal I/O
//! operation never run.

use std::sync::Arc;

use async_trait::async_trait;

use super::activity::{Activity, ConversationReference, ResourceResponse};
use super::context::TurnContext;
use super::TurnResult;

#[async_trait]
pub trait Interceptor<P: Send, R: Send>: Send + Sync {
    async fn intercept(
        &self,
        turn: &TurnContext,
        payload: &mut P,
        next: Next<'_, P, R>,
    ) -> TurnResult<R>;
}

/// The innermost link: the operation that actually performs the I/O.
#[async_trait]
pub trait Terminal<P: Send, R: Send>: Send + Sync {
    async fn run(&self, turn: &TurnContext, payload: &mut P) -> TurnResult<R>;
}

pub type SendInterceptor = Arc<dyn Interceptor<Vec<Activity>, Vec<ResourceResponse>>>;
pub type UpdateInterceptor = Arc<dyn Interceptor<Activity, ResourceResponse>>;
pub type DeleteInterceptor = Arc<dyn Interceptor<ConversationReference, ()>>;

/// The rest of the chain after the current interceptor.
pub struct Next<'a, P: Send, R: Send> {
    turn: &'a TurnContext,
    remaining: &'a [Arc<dyn Interceptor<P, R>>],
    terminal: &'a dyn Terminal<P, R>,
}

impl<'a, P: Send, R: Send> Next<'a, P, R> {
    pub fn new(
        turn: &'a TurnContext,
        remaining: &'a [Arc<dyn Interceptor<P, R>>],
        terminal: &'a dyn Terminal<P, R>,
    ) -> Self {
        Self {
            turn,
            remaining,
            terminal,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub async fn run(self, payload: &mut P) -> TurnResult<R> {
        match self.remaining.split_first() {
            Some((head, rest)) => {
                let next = Next::new(self.turn, rest, self.terminal);
                head.intercept(self.turn, payload, next).await
            }
            None => self.terminal.run(self.turn, payload).await,
        }
    }
}
