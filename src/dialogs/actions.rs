//! Expression-driven actions.
//!
//! Each action is a small dialog with its own id that does its work in
//! `begin_dialog` and ends. An [`ActionSequence`] runs its actions in order
//! by beginning them one after the other; it is a container, so every action
//! below it shares the sequence's state as the `dialog` scope. An action
//! that waits for input (a prompt begun through [`BeginDialog`]) suspends
//! the whole sequence until a later turn.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Dialog, DialogContext, DialogReason, DialogResult, DialogTurnResult};
use crate::eval::Value;

const INDEX: &str = "_index";
const RUNNING: &str = "_running";
const BRANCH: &str = "_branch";
const OPTIONS: &str = "options";
const RESULT: &str = "result";

// Begins `actions[index]` after recording the position on the active
// (owning) instance. `None` when the list is exhausted.
async fn run_action(
    dc: &mut DialogContext,
    actions: &[Arc<dyn Dialog>],
    index: usize,
) -> DialogResult<Option<DialogTurnResult>> {
    if let Some(instance) = dc.instance_mut(0) {
        instance.set(INDEX, index);
    }
    match actions.get(index) {
        Some(action) => {
            debug!("action {} ({})", index, action.id());
            dc.begin_dialog(action.id(), None).await.map(Some)
        }
        None => Ok(None),
    }
}

/// Runs `actions` from `index` for the owner on top of the stack, moving on
/// in a loop for as long as each action finishes at once.
///
/// Returns the result of the action that left the owner off the top (it
/// waits for input, or it ended the owner), or `None` once the list is
/// exhausted. While the loop runs, the owner's `resume_dialog` must not start
/// the next action itself; [`is_running`] tells it so.
async fn run_actions(
    dc: &mut DialogContext,
    actions: &[Arc<dyn Dialog>],
    index: usize,
) -> DialogResult<Option<DialogTurnResult>> {
    let depth = dc.stack_depth();
    let owner = match dc.instance_mut(0) {
        Some(instance) => {
            instance.set(RUNNING, true);
            instance.id.clone()
        }
        None => return Ok(None),
    };
    let outcome = drive_actions(dc, actions, index, depth, &owner).await;
    let offset = dc.stack_depth().checked_sub(depth);
    if let Some(instance) = offset.and_then(|offset| dc.instance_mut(offset)) {
        instance.remove(RUNNING);
    }
    outcome
}

async fn drive_actions(
    dc: &mut DialogContext,
    actions: &[Arc<dyn Dialog>],
    mut index: usize,
    depth: usize,
    owner: &str,
) -> DialogResult<Option<DialogTurnResult>> {
    loop {
        let Some(result) = run_action(dc, actions, index).await? else {
            return Ok(None);
        };
        let owner_on_top = dc.stack_depth() == depth
            && dc.active_dialog().is_some_and(|instance| instance.id == owner);
        if !owner_on_top {
            return Ok(Some(result));
        }
        index += 1;
    }
}

// Set while `run_actions` is looping over the active instance's actions.
fn is_running(dc: &DialogContext) -> bool {
    dc.active_dialog()
        .and_then(|instance| instance.get(RUNNING))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn current_index(dc: &DialogContext) -> usize {
    dc.active_dialog()
        .map_or(0, |instance| instance.get_index(INDEX))
}

/// Runs its actions in order and ends with `dialog.result`.
pub struct ActionSequence {
    id: String,
    actions: Vec<Arc<dyn Dialog>>,
    properties: Option<Value>,
}

impl ActionSequence {
    pub fn new(id: impl Into<String>, actions: Vec<Arc<dyn Dialog>>) -> Self {
        Self {
            id: id.into(),
            actions,
            properties: None,
        }
    }

    /// Properties readable as `%name` by the sequence's actions.
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    async fn run_next(&self, dc: &mut DialogContext, index: usize) -> DialogResult<DialogTurnResult> {
        if let Some(result) = run_actions(dc, &self.actions, index).await? {
            return Ok(result);
        }
        let result = dc
            .active_dialog()
            .and_then(|instance| instance.get(RESULT))
            .cloned()
            .unwrap_or_default();
        dc.end_dialog(result).await
    }
}

#[async_trait]
impl Dialog for ActionSequence {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        if let (Some(options), Some(instance)) = (options, dc.instance_mut(0)) {
            instance.set(OPTIONS, options);
        }
        self.run_next(dc, 0).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        let index = current_index(dc) + 1;
        self.run_next(dc, index).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        _result: Value,
    ) -> DialogResult<DialogTurnResult> {
        if is_running(dc) {
            return Ok(DialogTurnResult::waiting());
        }
        let index = current_index(dc) + 1;
        self.run_next(dc, index).await
    }

    fn is_container(&self) -> bool {
        true
    }

    fn class_memory(&self) -> Option<&Value> {
        self.properties.as_ref()
    }

    fn dependencies(&self) -> Vec<Arc<dyn Dialog>> {
        self.actions.clone()
    }
}

/// Runs one of two action lists depending on a condition. Not a container:
/// its actions keep writing to the enclosing sequence's `dialog` scope.
pub struct IfCondition {
    id: String,
    condition: String,
    actions: Vec<Arc<dyn Dialog>>,
    else_actions: Vec<Arc<dyn Dialog>>,
}

impl IfCondition {
    pub fn new(
        id: impl Into<String>,
        condition: impl Into<String>,
        actions: Vec<Arc<dyn Dialog>>,
    ) -> Self {
        Self {
            id: id.into(),
            condition: condition.into(),
            actions,
            else_actions: Vec::new(),
        }
    }

    pub fn with_else(mut self, else_actions: Vec<Arc<dyn Dialog>>) -> Self {
        self.else_actions = else_actions;
        self
    }

    fn branch(&self, taken: bool) -> &[Arc<dyn Dialog>] {
        if taken {
            &self.actions
        } else {
            &self.else_actions
        }
    }

    async fn run_next(
        &self,
        dc: &mut DialogContext,
        taken: bool,
        index: usize,
    ) -> DialogResult<DialogTurnResult> {
        match run_actions(dc, self.branch(taken), index).await? {
            Some(result) => Ok(result),
            None => dc.end_dialog(Value::Null).await,
        }
    }
}

#[async_trait]
impl Dialog for IfCondition {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let taken = dc.evaluate(&self.condition)?.is_truthy();
        debug!("{} took the {} branch", self.id, if taken { "then" } else { "else" });
        if let Some(instance) = dc.instance_mut(0) {
            instance.set(BRANCH, taken);
        }
        self.run_next(dc, taken, 0).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        _result: Value,
    ) -> DialogResult<DialogTurnResult> {
        if is_running(dc) {
            return Ok(DialogTurnResult::waiting());
        }
        let taken = dc
            .active_dialog()
            .and_then(|instance| instance.get(BRANCH))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let index = current_index(dc) + 1;
        self.run_next(dc, taken, index).await
    }

    fn dependencies(&self) -> Vec<Arc<dyn Dialog>> {
        self.actions
            .iter()
            .chain(self.else_actions.iter())
            .cloned()
            .collect()
    }
}

/// Writes the value of an expression to a memory path.
pub struct SetProperty {
    id: String,
    property: String,
    value: String,
}

impl SetProperty {
    pub fn new(id: impl Into<String>, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            property: property.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Dialog for SetProperty {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let value = dc.evaluate(&self.value)?;
        dc.state().set_value(&self.property, value)?;
        dc.end_dialog(Value::Null).await
    }
}

pub struct DeleteProperty {
    id: String,
    property: String,
}

impl DeleteProperty {
    pub fn new(id: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            property: property.into(),
        }
    }
}

#[async_trait]
impl Dialog for DeleteProperty {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.state().remove_value(&self.property)?;
        dc.end_dialog(Value::Null).await
    }
}

/// Sends a message rendered from a `${...}` template.
pub struct SendActivity {
    id: String,
    template: String,
}

impl SendActivity {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
        }
    }
}

#[async_trait]
impl Dialog for SendActivity {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let text = dc.evaluate_template(&self.template)?;
        dc.send_text(text).await?;
        dc.end_dialog(Value::Null).await
    }
}

/// Ends the enclosing container, handing it the value of an optional
/// expression as its result. Non-container dialogs in between are popped.
pub struct EndDialog {
    id: String,
    value: Option<String>,
}

impl EndDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[async_trait]
impl Dialog for EndDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let result = match &self.value {
            Some(expression) => dc.evaluate(expression)?,
            None => Value::Null,
        };
        dc.end_active_dialog(DialogReason::EndCalled).await?;
        while let Some(active) = dc.active_dialog() {
            let is_container = dc
                .find_dialog(&active.id)
                .is_some_and(|dialog| dialog.is_container());
            if is_container {
                break;
            }
            dc.end_active_dialog(DialogReason::EndCalled).await?;
        }
        dc.end_dialog(result).await
    }
}

/// Begins another dialog by id and, when it ends, stores its result at
/// `result_property` before ending itself with the same value.
pub struct BeginDialog {
    id: String,
    target: String,
    options: Option<String>,
    result_property: Option<String>,
}

impl BeginDialog {
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            options: None,
            result_property: None,
        }
    }

    /// An expression evaluated into the begun dialog's options.
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_result_property(mut self, property: impl Into<String>) -> Self {
        self.result_property = Some(property.into());
        self
    }
}

#[async_trait]
impl Dialog for BeginDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let options = match &self.options {
            Some(expression) => Some(dc.evaluate(expression)?),
            None => None,
        };
        dc.begin_dialog(&self.target, options).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        result: Value,
    ) -> DialogResult<DialogTurnResult> {
        if let Some(property) = &self.result_property {
            dc.state().set_value(property, result.clone())?;
        }
        dc.end_dialog(result).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::dialogs::{DialogSet, DialogState, TextPrompt};
    use crate::turn::{Activity, BufferedAdapter, TurnContext};

    fn arc<D: Dialog + 'static>(dialog: D) -> Arc<dyn Dialog> {
        Arc::new(dialog)
    }

    fn context(root: Arc<dyn Dialog>, text: &str, state: DialogState) -> (DialogContext, Arc<BufferedAdapter>) {
        let dialogs = Arc::new(DialogSet::new().with(root).unwrap());
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message(text)));
        (DialogContext::new(dialogs, turn, state), adapter)
    }

    async fn texts(adapter: &BufferedAdapter) -> Vec<String> {
        adapter
            .take()
            .await
            .iter()
            .map(|activity| activity.text().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_sequence_shares_dialog_scope_and_returns_result() {
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(SetProperty::new("set-count", "dialog.count", "2")),
                arc(SetProperty::new("set-double", "$double", "dialog.count * 2")),
                arc(SendActivity::new("say", "count=${dialog.count}, double=${$double}")),
                arc(SetProperty::new("set-result", "dialog.result", "$double + 1")),
            ],
        ));
        let (mut dc, adapter) = context(root, "hi", DialogState::default());
        let result = dc.begin_dialog("root", None).await.unwrap();

        assert_eq!(texts(&adapter).await, vec!["count=2, double=4"]);
        assert!(!result.has_active());
        assert_eq!(result.result(), &Value::Integer(5));
        assert_eq!(dc.stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_long_sequence_runs_without_nesting() {
        let increments = |prefix: &str| -> Vec<Arc<dyn Dialog>> {
            (0..1000)
                .map(|i| arc(SetProperty::new(format!("{}-{}", prefix, i), "dialog.n", "coalesce(dialog.n, 0) + 1")))
                .collect()
        };
        let mut actions = increments("seq");
        actions.push(arc(IfCondition::new("branch", "dialog.n == 1000", increments("if"))));
        actions.push(arc(SetProperty::new("finish", "dialog.result", "dialog.n")));
        let root = arc(ActionSequence::new("root", actions));
        let (mut dc, _) = context(root, "hi", DialogState::default());

        let result = dc.begin_dialog("root", None).await.unwrap();
        assert_eq!(result.result(), &Value::Integer(2000));
        assert_eq!(dc.stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_running_marker_is_cleared_when_waiting() {
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(SetProperty::new("set", "dialog.x", "1")),
                arc(BeginDialog::new("ask", "name")),
            ],
        ));
        let prompt = arc(TextPrompt::new("name", "Name?"));
        let dialogs = Arc::new(DialogSet::new().with(root).unwrap().with(prompt).unwrap());
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter, Activity::message("hi")));
        let mut dc = DialogContext::new(dialogs, turn, DialogState::default());
        dc.begin_dialog("root", None).await.unwrap();

        let root = dc.instance(2).unwrap();
        assert_eq!(root.id, "root");
        assert_eq!(root.get(RUNNING), None);
        assert_eq!(root.get_index(INDEX), 1);
    }

    #[tokio::test]
    async fn test_if_condition_branches() {
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(SetProperty::new("set-n", "conversation.n", "7")),
                arc(IfCondition::new(
                    "check",
                    "conversation.n > 5",
                    vec![arc(SendActivity::new("big", "big"))],
                )
                .with_else(vec![arc(SendActivity::new("small", "small"))])),
                arc(SendActivity::new("after", "after")),
            ],
        ));
        let (mut dc, adapter) = context(root, "hi", DialogState::default());
        dc.begin_dialog("root", None).await.unwrap();
        assert_eq!(texts(&adapter).await, vec!["big", "after"]);
    }

    #[tokio::test]
    async fn test_end_dialog_inside_branch_ends_the_sequence() {
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(IfCondition::new(
                    "check",
                    "true",
                    vec![arc(EndDialog::new("stop").with_value("'early'"))],
                )),
                arc(SendActivity::new("never", "never")),
            ],
        ));
        let (mut dc, adapter) = context(root, "hi", DialogState::default());
        let result = dc.begin_dialog("root", None).await.unwrap();

        assert!(texts(&adapter).await.is_empty());
        assert_eq!(dc.stack_depth(), 0);
        assert_eq!(result.result(), &Value::from("early"));
    }

    #[tokio::test]
    async fn test_nested_sequence_end_reports_parent_ended() {
        let inner = arc(ActionSequence::new(
            "inner",
            vec![arc(EndDialog::new("stop").with_value("1"))],
        ));
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(BeginDialog::new("run-inner", "inner").with_result_property("dialog.inner")),
                arc(SendActivity::new("report", "inner=${dialog.inner}")),
            ],
        ));
        let dialogs = Arc::new(DialogSet::new().with(root).unwrap().with(inner).unwrap());
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message("hi")));
        let mut dc = DialogContext::new(dialogs, turn, DialogState::default());

        dc.begin_dialog("root", None).await.unwrap();
        assert_eq!(texts(&adapter).await, vec!["inner=1"]);
        assert_eq!(dc.stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_sequence_suspends_on_prompt() {
        let root = arc(ActionSequence::new(
            "root",
            vec![
                arc(BeginDialog::new("ask", "name").with_result_property("user.name")),
                arc(DeleteProperty::new("forget", "conversation.draft")),
                arc(SendActivity::new("greet", "Hello ${user.name}")),
            ],
        ));
        let prompt = arc(TextPrompt::new("name", "Name?"));
        let dialogs = Arc::new(DialogSet::new().with(root).unwrap().with(prompt).unwrap());

        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message("hi")));
        let mut dc = DialogContext::new(dialogs.clone(), turn, DialogState::default())
            .with_memory("conversation", Value::from(json!({"draft": "x"})));
        let result = dc.begin_dialog("root", None).await.unwrap();
        assert!(result.has_active());
        assert_eq!(texts(&adapter).await, vec!["Name?"]);
        let ids: Vec<_> = dc.stack().dialog_stack.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["name", "ask", "root"]);
        let (state, memory) = dc.into_parts();

        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message("Ann")));
        let mut dc = DialogContext::new(dialogs, turn, state)
            .with_memory("conversation", memory["conversation"].clone());
        let result = dc.continue_dialog().await.unwrap();
        assert!(!result.has_active());
        assert_eq!(texts(&adapter).await, vec!["Hello Ann"]);
        assert_eq!(dc.evaluate("conversation.draft").unwrap(), Value::Null);
        assert_eq!(dc.evaluate("user.name").unwrap(), Value::from("Ann"));
    }

    #[tokio::test]
    async fn test_failed_expression_surfaces_as_error() {
        let root = arc(ActionSequence::new(
            "root",
            vec![arc(SetProperty::new("bad", "settings.x", "1"))],
        ));
        let (mut dc, _) = context(root, "hi", DialogState::default());
        let err = dc.begin_dialog("root", None).await.unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_sequence_properties_are_class_memory() {
        let root = arc(
            ActionSequence::new("root", vec![arc(SendActivity::new("say", "${%greeting}"))])
                .with_properties(Value::from(json!({"greeting": "hey"}))),
        );
        let (mut dc, adapter) = context(root, "hi", DialogState::default());
        dc.begin_dialog("root", None).await.unwrap();
        assert_eq!(texts(&adapter).await, vec!["hey"]);
    }
}
