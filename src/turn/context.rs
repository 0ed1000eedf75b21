use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::activity::{Activity, ConversationReference, ResourceResponse};
use super::adapter::ChannelAdapter;
use super::interceptor::{
    DeleteInterceptor, Next, SendInterceptor, Terminal, UpdateInterceptor,
};
use super::TurnResult;

/// Everything known about the turn being processed: the incoming activity,
/// the adapter replies go through, and the interceptors wrapped around it.
pub struct TurnContext {
    activity: Activity,
    adapter: Arc<dyn ChannelAdapter>,
    responded: AtomicBool,
    on_send: Vec<SendInterceptor>,
    on_update: Vec<UpdateInterceptor>,
    on_delete: Vec<DeleteInterceptor>,
}

impl fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnContext")
            .field("activity", &self.activity)
            .field("responded", &self.responded())
            .field("on_send", &self.on_send.len())
            .field("on_update", &self.on_update.len())
            .field("on_delete", &self.on_delete.len())
            .finish()
    }
}

impl TurnContext {
    pub fn new(adapter: Arc<dyn ChannelAdapter>, activity: Activity) -> Self {
        Self {
            activity,
            adapter,
            responded: AtomicBool::new(false),
            on_send: Vec::new(),
            on_update: Vec::new(),
            on_delete: Vec::new(),
        }
    }

    pub fn with_send_interceptor(mut self, interceptor: SendInterceptor) -> Self {
        self.on_send.push(interceptor);
        self
    }

    pub fn with_update_interceptor(mut self, interceptor: UpdateInterceptor) -> Self {
        self.on_update.push(interceptor);
        self
    }

    pub fn with_delete_interceptor(mut self, interceptor: DeleteInterceptor) -> Self {
        self.on_delete.push(interceptor);
        self
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn adapter(&self) -> &Arc<dyn ChannelAdapter> {
        &self.adapter
    }

    /// Whether anything has reached the adapter during this turn.
    pub fn responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    pub async fn send_activity(&self, activity: Activity) -> TurnResult<ResourceResponse> {
        let mut responses = self.send_activities(vec![activity]).await?;
        Ok(if responses.is_empty() {
            ResourceResponse::default()
        } else {
            responses.swap_remove(0)
        })
    }

    #[instrument(level = "debug", skip(self, activities), fields(count = activities.len()))]
    pub async fn send_activities(
        &self,
        mut activities: Vec<Activity>,
    ) -> TurnResult<Vec<ResourceResponse>> {
        for activity in activities.iter_mut() {
            activity.apply_reply_addressing(&self.activity);
        }
        Next::new(self, &self.on_send, &SendTerminal)
            .run(&mut activities)
            .await
    }

    pub async fn update_activity(&self, mut activity: Activity) -> TurnResult<ResourceResponse> {
        activity.apply_reply_addressing(&self.activity);
        Next::new(self, &self.on_update, &UpdateTerminal)
            .run(&mut activity)
            .await
    }

    pub async fn delete_activity(&self, activity_id: &str) -> TurnResult<()> {
        let mut reference = self.activity.conversation_reference();
        reference.activity_id = Some(activity_id.to_string());
        self.delete_conversation_activity(reference).await
    }

    pub async fn delete_conversation_activity(
        &self,
        mut reference: ConversationReference,
    ) -> TurnResult<()> {
        Next::new(self, &self.on_delete, &DeleteTerminal)
            .run(&mut reference)
            .await
    }
}

struct SendTerminal;

#[async_trait]
impl Terminal<Vec<Activity>, Vec<ResourceResponse>> for SendTerminal {
    async fn run(
        &self,
        turn: &TurnContext,
        payload: &mut Vec<Activity>,
    ) -> TurnResult<Vec<ResourceResponse>> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        let responses = turn.adapter.send_activities(payload).await?;
        turn.responded.store(true, Ordering::SeqCst);
        Ok(responses)
    }
}

struct UpdateTerminal;

#[async_trait]
impl Terminal<Activity, ResourceResponse> for UpdateTerminal {
    async fn run(&self, turn: &TurnContext, payload: &mut Activity) -> TurnResult<ResourceResponse> {
        turn.adapter.update_activity(payload).await
    }
}

struct DeleteTerminal;

#[async_trait]
impl Terminal<ConversationReference, ()> for DeleteTerminal {
    async fn run(&self, turn: &TurnContext, payload: &mut ConversationReference) -> TurnResult<()> {
        turn.adapter.delete_activity(payload).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::turn::{BufferedAdapter, Interceptor, TurnError};

    fn incoming() -> Activity {
        let mut activity = Activity::message("hi").with_from("ann").with_conversation("c1");
        activity.id = Some("in-1".to_string());
        activity
    }

    #[tokio::test]
    async fn test_send_fills_addressing() {
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = TurnContext::new(adapter.clone(), incoming());
        assert!(!turn.responded());
        turn.send_activity(Activity::message("hello")).await.unwrap();
        assert!(turn.responded());

        let sent = adapter.take().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].conversation_id, "c1");
        assert_eq!(sent[0].reply_to_id.as_deref(), Some("in-1"));
        assert_eq!(sent[0].recipient.as_ref().map(|a| a.id.as_str()), Some("ann"));
    }

    struct DeleteLog(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Interceptor<ConversationReference, ()> for DeleteLog {
        async fn intercept(
            &self,
            _turn: &TurnContext,
            payload: &mut ConversationReference,
            next: Next<'_, ConversationReference, ()>,
        ) -> TurnResult<()> {
            self.0
                .lock()
                .unwrap()
                .push(payload.activity_id.clone().unwrap_or_default());
            next.run(payload).await
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_pass_through_interceptors() {
        let adapter = Arc::new(BufferedAdapter::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let turn = TurnContext::new(adapter.clone(), incoming())
            .with_delete_interceptor(Arc::new(DeleteLog(log.clone())));

        let id = turn.send_activity(Activity::message("a")).await.unwrap().id;
        let mut edited = Activity::message("b");
        edited.id = Some(id.clone());
        turn.update_activity(edited).await.unwrap();
        assert_eq!(adapter.activities().await[0].text(), "b");

        turn.delete_activity(&id).await.unwrap();
        assert_eq!(adapter.sent_count().await, 0);
        assert_eq!(
            turn.delete_activity(&id).await,
            Err(TurnError::NotFound { id: id.clone() })
        );
        assert_eq!(*log.lock().unwrap(), vec![id.clone(), id]);
    }
}
