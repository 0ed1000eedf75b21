use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use super::{Dialog, DialogContext, DialogReason, DialogResult, DialogTurnResult};
use crate::eval::Value;

const STEP_INDEX: &str = "stepIndex";
const OPTIONS: &str = "options";

pub type WaterfallStepFn = Arc<
    dyn for<'a> Fn(&'a mut DialogContext, WaterfallStep) -> BoxFuture<'a, DialogResult<DialogTurnResult>>
        + Send
        + Sync,
>;

/// Boxes a closure as a waterfall step.
///
/// ```ignore
/// let ask = waterfall_step(|dc, _step| {
///     Box::pin(async move {
///         dc.send_text("Name?").await?;
///         Ok(DialogTurnResult::waiting())
///     })
/// });
/// ```
pub fn waterfall_step<F>(f: F) -> WaterfallStepFn
where
    F: for<'a> Fn(&'a mut DialogContext, WaterfallStep) -> BoxFuture<'a, DialogResult<DialogTurnResult>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// What a step is told about the turn it runs in.
#[derive(Clone)]
pub struct WaterfallStep {
    index: usize,
    options: Value,
    result: Value,
    reason: DialogReason,
    steps: Arc<Vec<WaterfallStepFn>>,
}

impl fmt::Debug for WaterfallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaterfallStep")
            .field("index", &self.index)
            .field("options", &self.options)
            .field("result", &self.result)
            .field("reason", &self.reason)
            .finish()
    }
}

impl WaterfallStep {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Options the waterfall was begun with.
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// The user's reply, or the result of the dialog the previous step began.
    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn reason(&self) -> DialogReason {
        self.reason
    }

    /// Skips straight to the following step with `result`.
    pub async fn next(self, dc: &mut DialogContext, result: Value) -> DialogResult<DialogTurnResult> {
        run_step(self.steps, dc, self.index + 1, DialogReason::NextCalled, result).await
    }
}

/// A fixed sequence of steps. Each step runs on its own turn unless it calls
/// [`WaterfallStep::next`] or begins a child that finishes at once. Running
/// past the last step ends the waterfall with the last result.
#[derive(Clone)]
pub struct WaterfallDialog {
    id: String,
    steps: Arc<Vec<WaterfallStepFn>>,
}

impl fmt::Debug for WaterfallDialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaterfallDialog")
            .field("id", &self.id)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl WaterfallDialog {
    pub fn new(id: impl Into<String>, steps: Vec<WaterfallStepFn>) -> Self {
        Self {
            id: id.into(),
            steps: Arc::new(steps),
        }
    }

    pub fn add_step(mut self, step: WaterfallStepFn) -> Self {
        Arc::make_mut(&mut self.steps).push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn current_index(dc: &DialogContext) -> usize {
        dc.active_dialog()
            .map_or(0, |instance| instance.get_index(STEP_INDEX))
    }
}

fn run_step(
    steps: Arc<Vec<WaterfallStepFn>>,
    dc: &mut DialogContext,
    index: usize,
    reason: DialogReason,
    result: Value,
) -> BoxFuture<'_, DialogResult<DialogTurnResult>> {
    Box::pin(async move {
        let options = match dc.instance_mut(0) {
            Some(instance) => {
                instance.set(STEP_INDEX, index);
                instance.get(OPTIONS).cloned().unwrap_or_default()
            }
            None => Value::Null,
        };
        match steps.get(index).cloned() {
            Some(step) => {
                debug!("waterfall step {} ({})", index, reason);
                let context = WaterfallStep {
                    index,
                    options,
                    result,
                    reason,
                    steps,
                };
                step(dc, context).await
            }
            None => dc.end_dialog(result).await,
        }
    })
}

#[async_trait]
impl Dialog for WaterfallDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        if let Some(instance) = dc.instance_mut(0) {
            instance.set(OPTIONS, options.unwrap_or_default());
        }
        run_step(self.steps.clone(), dc, 0, DialogReason::BeginCalled, Value::Null).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let reply = Value::from(dc.turn().activity().text());
        let index = Self::current_index(dc) + 1;
        run_step(self.steps.clone(), dc, index, DialogReason::ContinueCalled, reply).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        reason: DialogReason,
        result: Value,
    ) -> DialogResult<DialogTurnResult> {
        let index = Self::current_index(dc) + 1;
        run_step(self.steps.clone(), dc, index, reason, result).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialogs::{DialogSet, DialogState, TextPrompt};
    use crate::turn::{Activity, BufferedAdapter, TurnContext};

    fn say(text: &'static str) -> WaterfallStepFn {
        waterfall_step(move |dc, _step| {
            Box::pin(async move {
                dc.send_text(text).await?;
                Ok(DialogTurnResult::waiting())
            })
        })
    }

    fn finish_with_reply() -> WaterfallStepFn {
        waterfall_step(|dc, step| Box::pin(async move { dc.end_dialog(step.result().clone()).await }))
    }

    fn set() -> Arc<DialogSet> {
        let waterfall = WaterfallDialog::new("wf", vec![say("one"), say("two"), finish_with_reply()]);
        Arc::new(DialogSet::new().with(Arc::new(waterfall)).unwrap())
    }

    /// Runs one turn against a persisted stack and returns the new stack.
    async fn turn(
        dialogs: &Arc<DialogSet>,
        state: DialogState,
        text: &str,
    ) -> (DialogState, DialogTurnResult, Vec<String>) {
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message(text)));
        let mut dc = DialogContext::new(dialogs.clone(), turn, state);
        let result = if dc.stack_depth() == 0 {
            dc.begin_dialog("wf", None).await.unwrap()
        } else {
            dc.continue_dialog().await.unwrap()
        };
        let sent = adapter
            .take()
            .await
            .iter()
            .map(|activity| activity.text().to_string())
            .collect();
        (dc.into_parts().0, result, sent)
    }

    #[tokio::test]
    async fn test_steps_run_one_per_turn() {
        let dialogs = set();
        let (state, result, sent) = turn(&dialogs, DialogState::default(), "hi").await;
        assert!(result.has_active());
        assert_eq!(sent, vec!["one"]);

        let (state, _, sent) = turn(&dialogs, state, "a").await;
        assert_eq!(sent, vec!["two"]);
        assert_eq!(state.dialog_stack[0].get_index(STEP_INDEX), 1);

        let (state, result, sent) = turn(&dialogs, state, "last").await;
        assert!(sent.is_empty());
        assert_eq!(state.depth(), 0);
        assert!(result.has_result());
        assert_eq!(result.result(), &Value::from("last"));
    }

    #[tokio::test]
    async fn test_next_skips_ahead() {
        let skip = waterfall_step(|dc, step| {
            Box::pin(async move { step.next(dc, Value::from("skipped")).await })
        });
        let waterfall = WaterfallDialog::new("wf", vec![skip, finish_with_reply()]);
        let dialogs = Arc::new(DialogSet::new().with(Arc::new(waterfall)).unwrap());
        let (state, result, _) = turn(&dialogs, DialogState::default(), "hi").await;
        assert_eq!(state.depth(), 0);
        assert_eq!(result.result(), &Value::from("skipped"));
    }

    #[tokio::test]
    async fn test_child_result_resumes_next_step() {
        let ask = waterfall_step(|dc, _step| Box::pin(async move { dc.begin_dialog("name", None).await }));
        let greet = waterfall_step(|dc, step| {
            Box::pin(async move {
                let name = step.result().to_display_string();
                dc.send_text(format!("Hello {}", name)).await?;
                dc.end_dialog(Value::Null).await
            })
        });
        let waterfall = WaterfallDialog::new("wf", vec![ask, greet]);
        let prompt = TextPrompt::new("name", "What is your name?");
        let dialogs = Arc::new(
            DialogSet::new()
                .with(Arc::new(waterfall))
                .unwrap()
                .with(Arc::new(prompt))
                .unwrap(),
        );

        let (state, _, sent) = turn(&dialogs, DialogState::default(), "hi").await;
        assert_eq!(sent, vec!["What is your name?"]);
        assert_eq!(state.depth(), 2);

        let (state, result, sent) = turn(&dialogs, state, "Ann").await;
        assert_eq!(sent, vec!["Hello Ann"]);
        assert_eq!(state.depth(), 0);
        assert!(!result.has_active());
    }

    #[tokio::test]
    async fn test_empty_waterfall_ends_immediately() {
        let waterfall = WaterfallDialog::new("wf", Vec::new());
        assert!(waterfall.is_empty());
        let dialogs = Arc::new(DialogSet::new().with(Arc::new(waterfall)).unwrap());
        let (state, result, _) = turn(&dialogs, DialogState::default(), "hi").await;
        assert_eq!(state.depth(), 0);
        assert!(!result.has_result());
    }

    #[tokio::test]
    async fn test_options_reach_every_step() {
        let echo_options = waterfall_step(|dc, step| {
            Box::pin(async move { dc.end_dialog(step.options().clone()).await })
        });
        let waterfall = WaterfallDialog::new("wf", vec![say("wait")]).add_step(echo_options);
        assert_eq!(waterfall.len(), 2);
        let dialogs = Arc::new(DialogSet::new().with(Arc::new(waterfall)).unwrap());

        let adapter = Arc::new(BufferedAdapter::new());
        let turn_context = Arc::new(TurnContext::new(adapter, Activity::message("x")));
        let mut dc = DialogContext::new(dialogs.clone(), turn_context, DialogState::default());
        dc.begin_dialog("wf", Some(Value::from(5))).await.unwrap();
        let (state, _) = dc.into_parts();

        let (_, result, _) = turn(&dialogs, state, "y").await;
        assert_eq!(result.result(), &Value::Integer(5));
    }
}
