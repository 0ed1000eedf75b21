use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::activity::{Activity, ConversationReference, ResourceResponse};
use super::{TurnError, TurnResult};

/// The I/O side of a channel. Implementations deliver activities to the
/// user; the engine never talks to a channel except through this trait.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send_activities(&self, activities: &[Activity]) -> TurnResult<Vec<ResourceResponse>>;

    async fn update_activity(&self, activity: &Activity) -> TurnResult<ResourceResponse>;

    async fn delete_activity(&self, reference: &ConversationReference) -> TurnResult<()>;
}

/// Collects outgoing activities in memory until [`BufferedAdapter::take`] is
/// called. Each sent activity without an id gets a fresh one.
#[derive(Debug, Default)]
pub struct BufferedAdapter {
    outbox: Mutex<Vec<Activity>>,
}

impl BufferedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything sent so far.
    pub async fn take(&self) -> Vec<Activity> {
        std::mem::take(&mut *self.outbox.lock().await)
    }

    pub async fn activities(&self) -> Vec<Activity> {
        self.outbox.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.outbox.lock().await.len()
    }
}

#[async_trait]
impl ChannelAdapter for BufferedAdapter {
    async fn send_activities(&self, activities: &[Activity]) -> TurnResult<Vec<ResourceResponse>> {
        let mut outbox = self.outbox.lock().await;
        let mut responses = Vec::with_capacity(activities.len());
        for activity in activities {
            let mut activity = activity.clone();
            let id = activity
                .id
                .get_or_insert_with(|| Uuid::new_v4().to_string())
                .clone();
            debug!("buffered activity {}", id);
            outbox.push(activity);
            responses.push(ResourceResponse { id });
        }
        Ok(responses)
    }

    async fn update_activity(&self, activity: &Activity) -> TurnResult<ResourceResponse> {
        let id = activity.id.clone().ok_or(TurnError::MissingId)?;
        let mut outbox = self.outbox.lock().await;
        let slot = outbox
            .iter_mut()
            .find(|sent| sent.id.as_deref() == Some(id.as_str()))
            .ok_or_else(|| TurnError::NotFound { id: id.clone() })?;
        *slot = activity.clone();
        Ok(ResourceResponse { id })
    }

    async fn delete_activity(&self, reference: &ConversationReference) -> TurnResult<()> {
        let id = reference.activity_id.as_deref().ok_or(TurnError::MissingId)?;
        let mut outbox = self.outbox.lock().await;
        let before = outbox.len();
        outbox.retain(|sent| sent.id.as_deref() != Some(id));
        if outbox.len() == before {
            return Err(TurnError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}
