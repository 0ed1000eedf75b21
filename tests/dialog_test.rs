use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parley::dialogs::{
    ActionSequence, BeginDialog, Dialog, DialogError, DialogManager, IfCondition, NumberPrompt,
    SendActivity, SetProperty, TextPrompt,
};
use parley::recognizer::RegexRecognizer;
use parley::storage::{MemoryStorage, Storage};
use parley::turn::{
    Activity, Interceptor, Next, ResourceResponse, SendInterceptor, TurnContext, TurnResult,
};
use parley::EngineConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn arc<D: Dialog + 'static>(dialog: D) -> Arc<dyn Dialog> {
    Arc::new(dialog)
}

fn order_pizza() -> Arc<dyn Dialog> {
    arc(ActionSequence::new(
        "order",
        vec![
            arc(IfCondition::new(
                "greet",
                "#greeting",
                vec![arc(SendActivity::new("hello", "Hello!"))],
            )),
            arc(BeginDialog::new("ask-size", "size").with_result_property("dialog.size")),
            arc(BeginDialog::new("ask-count", "count").with_result_property("dialog.count")),
            arc(SetProperty::new(
                "remember",
                "user.orders",
                "coalesce(user.orders, 0) + dialog.count",
            )),
            arc(SendActivity::new(
                "confirm",
                "${dialog.count} ${dialog.size} pizza${if(dialog.count > 1, 's', '')}, ${addOrdinal(user.orders)} so far.",
            )),
        ],
    ))
}

fn manager(storage: Arc<dyn Storage>) -> DialogManager {
    let recognizer = RegexRecognizer::new()
        .add_intent("greeting", r"(?i)^(hi|hello)\b")
        .unwrap();
    DialogManager::new(order_pizza(), storage, EngineConfig::default())
        .unwrap()
        .with_dialog(arc(TextPrompt::new("size", "What size?")))
        .unwrap()
        .with_dialog(arc(NumberPrompt::new("count", "How many?")
            .with_retry_prompt("How many ${dialog.size} pizzas, as a number?")
            .with_validator(|value| value.as_i64().is_some_and(|n| n > 0))))
        .unwrap()
        .with_recognizer(Arc::new(recognizer))
}

async fn say(manager: &DialogManager, text: &str) -> Vec<String> {
    manager
        .process_turn("pizza", Activity::message(text).with_from("ann"))
        .await
        .unwrap()
        .iter()
        .map(|activity| activity.text().to_string())
        .collect()
}

#[tokio::test]
async fn it_runs_a_multi_turn_conversation() {
    let storage = Arc::new(MemoryStorage::new());
    let manager = manager(storage.clone());

    assert_eq!(say(&manager, "hi there").await, vec!["Hello!", "What size?"]);
    assert_eq!(say(&manager, "large").await, vec!["How many?"]);
    assert_eq!(
        say(&manager, "lots").await,
        vec!["How many large pizzas, as a number?"]
    );
    assert_eq!(say(&manager, "2").await, vec!["2 large pizzas, 2nd so far."]);

    // The next message starts a fresh order; user state carries over.
    assert_eq!(say(&manager, "again").await, vec!["What size?"]);
    assert_eq!(say(&manager, "small").await, vec!["How many?"]);
    assert_eq!(say(&manager, "1").await, vec!["1 small pizza, 3rd so far."]);

    let items = storage.read(&["user/ann".to_string()]).await.unwrap();
    assert_eq!(items["user/ann"].value, json!({"orders": 3}));
}

#[tokio::test]
async fn it_aborts_on_unknown_dialog() {
    let root = arc(BeginDialog::new("start", "nowhere"));
    let manager =
        DialogManager::new(root, Arc::new(MemoryStorage::new()), EngineConfig::default()).unwrap();
    let err = manager
        .process_turn("c", Activity::message("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, DialogError::NotFound { id } if id == "nowhere"));
}

struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl Interceptor<Vec<Activity>, Vec<ResourceResponse>> for Counting {
    async fn intercept(
        &self,
        _turn: &TurnContext,
        activities: &mut Vec<Activity>,
        next: Next<'_, Vec<Activity>, Vec<ResourceResponse>>,
    ) -> TurnResult<Vec<ResourceResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for activity in activities.iter_mut() {
            activity.text = activity.text.as_ref().map(|text| text.to_uppercase());
        }
        next.run(activities).await
    }
}

#[tokio::test]
async fn it_runs_send_interceptors_on_every_reply() {
    let counting = Arc::new(Counting {
        calls: AtomicUsize::new(0),
    });
    let interceptor: SendInterceptor = counting.clone();
    let manager = manager(Arc::new(MemoryStorage::new())).with_send_interceptor(interceptor);
    assert_eq!(say(&manager, "hello").await, vec!["HELLO!", "WHAT SIZE?"]);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn it_runs_long_action_sequences_in_one_turn() {
    let mut actions: Vec<Arc<dyn Dialog>> = (0..1500)
        .map(|i| {
            arc(SetProperty::new(
                format!("step-{}", i),
                "conversation.steps",
                "coalesce(conversation.steps, 0) + 1",
            ))
        })
        .collect();
    actions.push(arc(SendActivity::new("done", "${conversation.steps} steps")));
    let root = arc(ActionSequence::new("long", actions));
    let manager =
        DialogManager::new(root, Arc::new(MemoryStorage::new()), EngineConfig::default()).unwrap();
    let replies = manager
        .process_turn("c", Activity::message("go"))
        .await
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text(), "1500 steps");
}
