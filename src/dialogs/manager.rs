use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use super::{Dialog, DialogContext, DialogError, DialogResult, DialogSet, DialogState, DialogTurnResult};
use crate::config::EngineConfig;
use crate::eval::{ExpressionEvaluator, Value};
use crate::functions::FunctionTable;
use crate::memory::{ScopeRegistry, CONVERSATION, TURN, USER};
use crate::recognizer::{Recognized, Recognizer};
use crate::storage::{Storage, StoreItem, ANY_ETAG};
use crate::turn::{
    Activity, BufferedAdapter, DeleteInterceptor, SendInterceptor, TurnContext, UpdateInterceptor,
};

/// Runs whole turns: loads a conversation's state, drives the dialog stack
/// with the incoming activity, and saves the state back.
pub struct DialogManager {
    root_id: String,
    dialogs: Arc<DialogSet>,
    storage: Arc<dyn Storage>,
    recognizer: Option<Arc<dyn Recognizer>>,
    scopes: Arc<ScopeRegistry>,
    evaluator: Arc<ExpressionEvaluator>,
    settings: Arc<Value>,
    config: EngineConfig,
    on_send: Vec<SendInterceptor>,
    on_update: Vec<UpdateInterceptor>,
    on_delete: Vec<DeleteInterceptor>,
}

impl DialogManager {
    pub fn new(
        root: Arc<dyn Dialog>,
        storage: Arc<dyn Storage>,
        config: EngineConfig,
    ) -> DialogResult<Self> {
        let root_id = root.id().to_string();
        let dialogs = DialogSet::new().with(root)?;
        let evaluator = ExpressionEvaluator::new(Arc::new(FunctionTable::builtin()), &config.expression);
        Ok(Self {
            root_id,
            dialogs: Arc::new(dialogs),
            storage,
            recognizer: None,
            scopes: Arc::new(ScopeRegistry::default()),
            evaluator: Arc::new(evaluator),
            settings: Arc::new(Value::from(config.settings.clone())),
            config,
            on_send: Vec::new(),
            on_update: Vec::new(),
            on_delete: Vec::new(),
        })
    }

    /// Registers a dialog the root starts by id without declaring it.
    pub fn with_dialog(mut self, dialog: Arc<dyn Dialog>) -> DialogResult<Self> {
        Arc::make_mut(&mut self.dialogs).add(dialog)?;
        Ok(self)
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_scopes(mut self, scopes: ScopeRegistry) -> Self {
        self.scopes = Arc::new(scopes);
        self
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.evaluator = Arc::new(ExpressionEvaluator::new(
            Arc::new(functions),
            &self.config.expression,
        ));
        self
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

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    /// Processes one incoming activity and returns the replies.
    ///
    /// Fatal errors and storage conflicts are returned without saving
    /// anything. Any other error is logged, the configured error message is
    /// sent, and the conversation's dialog stack is cleared.
    #[instrument(level = "debug", skip(self, activity))]
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        mut activity: Activity,
    ) -> DialogResult<Vec<Activity>> {
        if activity.conversation_id.is_empty() {
            activity.conversation_id = conversation_id.to_string();
        }
        let keys = StateKeys::new(&self.config, conversation_id, &activity);
        let mut items = self
            .with_timeout(self.storage.read(&keys.all()))
            .await??;
        let stack_item = items.remove(&keys.dialog_state);
        let conversation_item = items.remove(&keys.conversation);
        let user_item = keys.user.as_ref().and_then(|key| items.remove(key));

        let dialog_state: DialogState = match &stack_item {
            Some(item) => serde_json::from_value(item.value.clone())
                .map_err(|e| DialogError::Serialization(e.to_string()))?,
            None => DialogState::default(),
        };

        let recognized = match &self.recognizer {
            Some(recognizer) => recognizer.recognize(&activity).await?,
            None => Recognized {
                text: activity.text().to_string(),
                ..Default::default()
            },
        };
        let mut turn_root = HashMap::new();
        turn_root.insert(
            "activity".to_string(),
            serde_json::to_value(&activity)
                .map(Value::from)
                .map_err(|e| DialogError::Serialization(e.to_string()))?,
        );
        turn_root.insert("recognized".to_string(), recognized.to_value());

        let adapter = Arc::new(BufferedAdapter::new());
        let turn = self.turn_context(adapter.clone(), activity);
        let mut dc = DialogContext::new(self.dialogs.clone(), Arc::new(turn), dialog_state)
            .with_shared_settings(self.settings.clone())
            .with_scopes(self.scopes.clone())
            .with_evaluator(self.evaluator.clone())
            .with_max_stack_depth(self.config.dialogs.max_stack_depth)
            .with_memory(TURN, Value::Map(turn_root))
            .with_memory(CONVERSATION, stored_value(&conversation_item));
        if keys.user.is_some() {
            dc = dc.with_memory(USER, stored_value(&user_item));
        }

        match self.run(&mut dc).await {
            Ok(result) => debug!(
                "turn finished, active: {}, depth: {}",
                result.has_active(),
                dc.stack_depth()
            ),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("turn failed for {}: {}", conversation_id, e);
                dc.send_text(self.config.error_message.clone()).await?;
                dc.cancel_all_dialogs().await?;
            }
        }

        let (dialog_state, mut memory) = dc.into_parts();
        let mut changes = HashMap::new();
        let stack_value = serde_json::to_value(&dialog_state)
            .map_err(|e| DialogError::Serialization(e.to_string()))?;
        changes.insert(
            keys.dialog_state.clone(),
            self.store_item(stack_value, &stack_item),
        );
        if let Some(conversation) = memory.remove(CONVERSATION) {
            changes.insert(
                keys.conversation.clone(),
                self.store_item(conversation.into(), &conversation_item),
            );
        }
        if let (Some(key), Some(user)) = (&keys.user, memory.remove(USER)) {
            changes.insert(key.clone(), self.store_item(user.into(), &user_item));
        }
        self.with_timeout(self.storage.write(changes)).await??;

        let replies = adapter.take().await;
        info!("{} replies for {}", replies.len(), conversation_id);
        Ok(replies)
    }

    async fn run(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        if dc.stack_depth() == 0 {
            dc.begin_dialog(&self.root_id, None).await
        } else {
            dc.continue_dialog().await
        }
    }

    fn turn_context(&self, adapter: Arc<BufferedAdapter>, activity: Activity) -> TurnContext {
        let mut turn = TurnContext::new(adapter, activity);
        for interceptor in &self.on_send {
            turn = turn.with_send_interceptor(interceptor.clone());
        }
        for interceptor in &self.on_update {
            turn = turn.with_update_interceptor(interceptor.clone());
        }
        for interceptor in &self.on_delete {
            turn = turn.with_delete_interceptor(interceptor.clone());
        }
        turn
    }

    fn store_item(&self, value: serde_json::Value, previous: &Option<StoreItem>) -> StoreItem {
        let e_tag = if self.config.state.last_writer_wins {
            Some(ANY_ETAG.to_string())
        } else {
            previous.as_ref().and_then(|item| item.e_tag.clone())
        };
        StoreItem { value, e_tag }
    }

    async fn with_timeout<T>(&self, operation: impl Future<Output = T>) -> DialogResult<T> {
        tokio::time::timeout(self.config.storage_timeout, operation)
            .await
            .map_err(|_| DialogError::Timeout)
    }
}

fn stored_value(item: &Option<StoreItem>) -> Value {
    item.as_ref()
        .map(|item| Value::from(item.value.clone()))
        .filter(|value| value.as_map().is_some())
        .unwrap_or_else(Value::empty_map)
}

struct StateKeys {
    dialog_state: String,
    conversation: String,
    user: Option<String>,
}

impl StateKeys {
    fn new(config: &EngineConfig, conversation_id: &str, activity: &Activity) -> Self {
        Self {
            dialog_state: config.state.dialog_state_key(conversation_id),
            conversation: config.state.conversation_key(conversation_id),
            user: activity
                .from
                .as_ref()
                .map(|from| config.state.user_key(&from.id)),
        }
    }

    fn all(&self) -> Vec<String> {
        let mut keys = vec![self.dialog_state.clone(), self.conversation.clone()];
        keys.extend(self.user.clone());
        keys
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialogs::{ActionSequence, BeginDialog, SendActivity, SetProperty, TextPrompt};
    use crate::storage::{MemoryStorage, StorageError, StorageResult};
    use std::time::Duration;

    fn arc<D: Dialog + 'static>(dialog: D) -> Arc<dyn Dialog> {
        Arc::new(dialog)
    }

    fn greeter() -> Arc<dyn Dialog> {
        arc(ActionSequence::new(
            "root",
            vec![
                arc(BeginDialog::new("ask", "name").with_result_property("user.name")),
                arc(SetProperty::new("count", "conversation.visits", "coalesce(conversation.visits, 0) + 1")),
                arc(SendActivity::new("greet", "Hello ${user.name} (${conversation.visits})")),
            ],
        ))
    }

    fn manager(storage: Arc<dyn Storage>) -> DialogManager {
        DialogManager::new(greeter(), storage, EngineConfig::default())
            .unwrap()
            .with_dialog(arc(TextPrompt::new("name", "Name?")))
            .unwrap()
    }

    fn texts(replies: &[Activity]) -> Vec<&str> {
        replies.iter().map(Activity::text).collect()
    }

    #[tokio::test]
    async fn test_state_survives_between_turns() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(storage.clone());

        let replies = manager
            .process_turn("c1", Activity::message("hi").with_from("u1"))
            .await
            .unwrap();
        assert_eq!(texts(&replies), vec!["Name?"]);
        assert_eq!(replies[0].conversation_id, "c1");

        let replies = manager
            .process_turn("c1", Activity::message("Ann").with_from("u1"))
            .await
            .unwrap();
        assert_eq!(texts(&replies), vec!["Hello Ann (1)"]);

        let keys = vec!["user/u1".to_string(), "conversation/c1/dialogState".to_string()];
        let items = storage.read(&keys).await.unwrap();
        assert_eq!(items["user/u1"].value, serde_json::json!({"name": "Ann"}));
        assert_eq!(
            items["conversation/c1/dialogState"].value,
            serde_json::json!({"dialogStack": []})
        );
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let manager = manager(Arc::new(MemoryStorage::new()));
        manager
            .process_turn("a", Activity::message("hi").with_from("u1"))
            .await
            .unwrap();
        let replies = manager
            .process_turn("b", Activity::message("hi").with_from("u2"))
            .await
            .unwrap();
        assert_eq!(texts(&replies), vec!["Name?"]);
    }

    #[tokio::test]
    async fn test_unknown_dialog_aborts_without_saving() {
        let root = arc(ActionSequence::new(
            "root",
            vec![arc(BeginDialog::new("go", "missing"))],
        ));
        let storage = Arc::new(MemoryStorage::new());
        let manager = DialogManager::new(root, storage.clone(), EngineConfig::default()).unwrap();
        let err = manager
            .process_turn("c1", Activity::message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogError::NotFound { ref id } if id == "missing"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_recoverable_error_resets_the_conversation() {
        let root = arc(ActionSequence::new(
            "root",
            vec![arc(SetProperty::new("bad", "conversation.x", "substring('hello', 10, 1)"))],
        ));
        let storage = Arc::new(MemoryStorage::new());
        let manager = DialogManager::new(root, storage.clone(), EngineConfig::default()).unwrap();
        let replies = manager
            .process_turn("c1", Activity::message("hi"))
            .await
            .unwrap();
        assert_eq!(texts(&replies), vec!["Sorry, something went wrong."]);
        let items = storage
            .read(&["conversation/c1/dialogState".to_string()])
            .await
            .unwrap();
        assert_eq!(
            items["conversation/c1/dialogState"].value,
            serde_json::json!({"dialogStack": []})
        );
    }

    /// Accepts reads, rejects every write with a conflict.
    struct Conflicting;

    #[async_trait]
    impl Storage for Conflicting {
        async fn read(&self, _keys: &[String]) -> StorageResult<HashMap<String, StoreItem>> {
            Ok(HashMap::new())
        }

        async fn write(&self, changes: HashMap<String, StoreItem>) -> StorageResult<()> {
            let key = changes.into_keys().next().unwrap_or_default();
            Err(StorageError::ETagConflict { key })
        }

        async fn delete(&self, _keys: &[String]) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_storage_conflict_propagates() {
        let manager = manager(Arc::new(Conflicting));
        let err = manager
            .process_turn("c1", Activity::message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogError::Storage(StorageError::ETagConflict { .. })));
    }

    /// Never answers a read.
    struct Stalled;

    #[async_trait]
    impl Storage for Stalled {
        async fn read(&self, _keys: &[String]) -> StorageResult<HashMap<String, StoreItem>> {
            std::future::pending().await
        }

        async fn write(&self, _changes: HashMap<String, StoreItem>) -> StorageResult<()> {
            Ok(())
        }

        async fn delete(&self, _keys: &[String]) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_storage_times_out() {
        let config = EngineConfig {
            storage_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let manager = DialogManager::new(greeter(), Arc::new(Stalled), config).unwrap();
        let err = manager
            .process_turn("c1", Activity::message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogError::Timeout));
    }

    #[tokio::test]
    async fn test_settings_and_recognizer_reach_memory() {
        use crate::recognizer::RegexRecognizer;

        let root = arc(ActionSequence::new(
            "root",
            vec![arc(SendActivity::new(
                "say",
                "${settings.botName}: ${if(#greeting, 'hello', 'what?')} ${@city}",
            ))],
        ));
        let config = EngineConfig {
            settings: serde_json::json!({"botName": "Parley"}),
            ..Default::default()
        };
        let recognizer = RegexRecognizer::new()
            .add_intent("greeting", r"(?i)^hi")
            .unwrap()
            .add_intent("travel", r"to (?P<city>\w+)")
            .unwrap();
        let manager = DialogManager::new(root, Arc::new(MemoryStorage::new()), config)
            .unwrap()
            .with_recognizer(Arc::new(recognizer));
        let replies = manager
            .process_turn("c1", Activity::message("hi, off to Rome"))
            .await
            .unwrap();
        assert_eq!(texts(&replies), vec!["Parley: hello Rome"]);
    }
}
