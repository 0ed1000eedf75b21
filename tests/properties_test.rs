use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parley::dialogs::{
    Dialog, DialogContext, DialogError, DialogReason, DialogResult, DialogSet, DialogState,
    DialogTurnResult,
};
use parley::eval::Value;
use parley::turn::{
    Activity, BufferedAdapter, Interceptor, Next, ResourceResponse, SendInterceptor, TurnContext,
    TurnResult,
};
use proptest::prelude::*;
use tokio::runtime::Runtime;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Waits on begin and on resume, so every transition changes depth by one.
struct Wait(String);

#[async_trait]
impl Dialog for Wait {
    fn id(&self) -> &str {
        &self.0
    }

    async fn begin_dialog(
        &self,
        _dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        Ok(DialogTurnResult::waiting())
    }

    async fn resume_dialog(
        &self,
        _dc: &mut DialogContext,
        _reason: DialogReason,
        _result: Value,
    ) -> DialogResult<DialogTurnResult> {
        Ok(DialogTurnResult::waiting())
    }
}

fn context(ids: &[&str]) -> DialogContext {
    let mut dialogs = DialogSet::new();
    for id in ids {
        dialogs.add(Arc::new(Wait(id.to_string()))).unwrap();
    }
    let turn = Arc::new(TurnContext::new(
        Arc::new(BufferedAdapter::new()),
        Activity::message("x"),
    ));
    DialogContext::new(Arc::new(dialogs), turn, DialogState::default())
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        any::<bool>().prop_map(Value::Boolean),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(2, 8, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::hash_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn path() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("user"), Just("conversation"), Just("turn")],
        prop::collection::vec("[a-z][a-z0-9_]{0,7}", 1..4),
    )
        .prop_map(|(scope, segments)| format!("{}.{}", scope, segments.join(".")))
}

proptest! {
    #[test]
    fn set_then_get_returns_a_copy(path in path(), value in value()) {
        let mut dc = context(&[]);
        dc.state().set_value(&path, value.clone()).unwrap();

        let mut read = dc.state().get_value(&path).unwrap().unwrap();
        prop_assert_eq!(&read, &value);

        match &mut read {
            Value::Map(map) => {
                map.insert("extra".to_string(), Value::Null);
            }
            Value::List(items) => items.push(Value::Null),
            _ => {}
        }
        prop_assert_eq!(dc.state().get_value(&path).unwrap(), Some(value));
    }

    #[test]
    fn begin_and_end_move_depth_by_one(depth in 1usize..8, result in prop::option::of(scalar())) {
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async {
            let mut dc = context(&["wait"]);
            for expected in 1..=depth {
                let begun = dc.begin_dialog("wait", None).await.unwrap();
                assert!(begun.has_active());
                assert_eq!(dc.stack_depth(), expected);
            }
            let result = result.unwrap_or(Value::Null);
            for expected in (0..depth).rev() {
                let ended = dc.end_dialog(result.clone()).await.unwrap();
                assert_eq!(dc.stack_depth(), expected);
                if expected == 0 {
                    assert!(!ended.has_active());
                    assert_eq!(ended.has_result(), !result.is_null());
                }
            }
        });
    }

    #[test]
    fn replace_keeps_depth(depth in 1usize..6) {
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async {
            let mut dc = context(&["a", "b"]);
            for _ in 0..depth {
                dc.begin_dialog("a", None).await.unwrap();
            }
            dc.replace_dialog("b", None).await.unwrap();
            assert_eq!(dc.stack_depth(), depth);
            assert_eq!(dc.active_dialog().unwrap().id, "b");
        });
    }

    #[test]
    fn unknown_dialog_is_not_found(ids in prop::collection::hash_set("[a-z]{1,5}", 0..5)) {
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut dc = context(&ids);
            let err = dc.begin_dialog("NOT-REGISTERED", None).await.unwrap_err();
            assert!(matches!(err, DialogError::NotFound { .. }));
            assert_eq!(dc.stack_depth(), 0);
        });
    }

    #[test]
    fn interceptor_short_circuit_stops_the_chain(len in 1usize..6, stop in 0usize..6) {
        let stop = stop % len;
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let adapter = Arc::new(BufferedAdapter::new());
            let mut turn = TurnContext::new(adapter.clone(), Activity::message("x"));
            for index in 0..len {
                let interceptor: SendInterceptor = Arc::new(Step {
                    forward: index != stop,
                    calls: calls.clone(),
                });
                turn = turn.with_send_interceptor(interceptor);
            }
            turn.send_activity(Activity::message("out")).await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), stop + 1);
            assert_eq!(adapter.sent_count().await, 0);
            assert!(!turn.responded());
        });
    }
}

struct Step {
    forward: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Interceptor<Vec<Activity>, Vec<ResourceResponse>> for Step {
    async fn intercept(
        &self,
        _turn: &TurnContext,
        activities: &mut Vec<Activity>,
        next: Next<'_, Vec<Activity>, Vec<ResourceResponse>>,
    ) -> TurnResult<Vec<ResourceResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.forward {
            next.run(activities).await
        } else {
            Ok(Vec::new())
        }
    }
}
