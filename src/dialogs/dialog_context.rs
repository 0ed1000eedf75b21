use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{
    Dialog, DialogError, DialogInstance, DialogReason, DialogResult, DialogSet, DialogState,
    DialogTurnResult,
};
use crate::config::{DialogConfig, ExpressionConfig};
use crate::eval::{ExpressionEvaluator, Value};
use crate::functions::FunctionTable;
use crate::memory::{DialogMemory, DialogStateManager, ScopeRegistry};
use crate::turn::{Activity, ResourceResponse, TurnContext};

/// The dialog stack of one conversation during one turn, together with the
/// memory roots and services the running dialogs need.
pub struct DialogContext {
    dialogs: Arc<DialogSet>,
    turn: Arc<TurnContext>,
    state: DialogState,
    memory: HashMap<String, Value>,
    settings: Arc<Value>,
    scopes: Arc<ScopeRegistry>,
    evaluator: Arc<ExpressionEvaluator>,
    max_stack_depth: usize,
}

impl fmt::Debug for DialogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogContext")
            .field("stack", &self.state.dialog_stack)
            .field("memory", &self.memory.keys().collect::<Vec<_>>())
            .field("dialogs", &self.dialogs)
            .finish()
    }
}

impl DialogContext {
    pub fn new(dialogs: Arc<DialogSet>, turn: Arc<TurnContext>, state: DialogState) -> Self {
        Self {
            dialogs,
            turn,
            state,
            memory: HashMap::new(),
            settings: Arc::new(Value::empty_map()),
            scopes: Arc::new(ScopeRegistry::default()),
            evaluator: Arc::new(ExpressionEvaluator::new(
                Arc::new(FunctionTable::builtin()),
                &ExpressionConfig::default(),
            )),
            max_stack_depth: DialogConfig::default().max_stack_depth,
        }
    }

    pub fn with_settings(self, settings: Value) -> Self {
        self.with_shared_settings(Arc::new(settings))
    }

    pub fn with_shared_settings(mut self, settings: Arc<Value>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_scopes(mut self, scopes: Arc<ScopeRegistry>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_max_stack_depth(mut self, max_stack_depth: usize) -> Self {
        self.max_stack_depth = max_stack_depth;
        self
    }

    /// Installs the root object of a host-held scope such as `user`.
    pub fn with_memory(mut self, scope: &str, root: Value) -> Self {
        self.memory.insert(scope.to_lowercase(), root);
        self
    }

    /// Hands back the stack and the host-held scope roots for persisting.
    pub fn into_parts(self) -> (DialogState, HashMap<String, Value>) {
        (self.state, self.memory)
    }

    pub fn turn(&self) -> &Arc<TurnContext> {
        &self.turn
    }

    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    pub fn evaluator(&self) -> &Arc<ExpressionEvaluator> {
        &self.evaluator
    }

    // Scope roots.

    pub fn memory_root(&self, scope: &str) -> Option<&Value> {
        self.memory.get(scope)
    }

    pub fn memory_root_mut(&mut self, scope: &str) -> &mut Value {
        self.memory
            .entry(scope.to_string())
            .or_insert_with(Value::empty_map)
    }

    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Stack position whose state backs the `dialog` scope: the nearest
    /// container from the top, or the active dialog when there is none.
    pub fn dialog_scope_index(&self) -> Option<usize> {
        if self.state.dialog_stack.is_empty() {
            return None;
        }
        self.state
            .dialog_stack
            .iter()
            .position(|instance| {
                self.dialogs
                    .find(&instance.id)
                    .is_some_and(|dialog| dialog.is_container())
            })
            .or(Some(0))
    }

    // Stack inspection.

    pub fn stack_depth(&self) -> usize {
        self.state.depth()
    }

    pub fn stack(&self) -> &DialogState {
        &self.state
    }

    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.state.dialog_stack.front()
    }

    pub fn instance(&self, index: usize) -> Option<&DialogInstance> {
        self.state.dialog_stack.get(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut DialogInstance> {
        self.state.dialog_stack.get_mut(index)
    }

    pub fn find_dialog(&self, id: &str) -> Option<&Arc<dyn Dialog>> {
        self.dialogs.find(id)
    }

    fn lookup(&self, id: &str) -> DialogResult<Arc<dyn Dialog>> {
        self.dialogs
            .find(id)
            .cloned()
            .ok_or_else(|| DialogError::not_found(id))
    }

    // Memory and expressions.

    pub fn state(&mut self) -> DialogStateManager<'_> {
        DialogStateManager::new(self.scopes.clone(), self)
    }

    pub fn memory(&self) -> DialogMemory<'_> {
        DialogMemory::new(&self.scopes, self)
    }

    pub fn evaluate(&self, text: &str) -> DialogResult<Value> {
        let expression = self.evaluator.parse(text)?;
        Ok(self.evaluator.evaluate(&expression, &self.memory())?)
    }

    /// Renders text with `${...}` placeholders. Text without placeholders is
    /// returned as is.
    pub fn evaluate_template(&self, text: &str) -> DialogResult<String> {
        if !text.contains("${") {
            return Ok(text.to_string());
        }
        Ok(self.evaluate(&template_source(text))?.to_display_string())
    }

    // Output.

    pub async fn send_activity(&self, activity: Activity) -> DialogResult<ResourceResponse> {
        Ok(self.turn.send_activity(activity).await?)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> DialogResult<ResourceResponse> {
        self.send_activity(Activity::message(text)).await
    }

    // Transitions.

    /// Pushes a new instance of dialog `id` and starts it.
    #[instrument(level = "debug", skip(self, options), fields(depth = self.stack_depth()))]
    pub async fn begin_dialog(
        &mut self,
        id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let depth = self.stack_depth();
        if depth >= self.max_stack_depth {
            return Err(DialogError::StackOverflow {
                max: self.max_stack_depth,
            });
        }
        let dialog = self.lookup(id)?;
        self.state.dialog_stack.push_front(DialogInstance::new(id));
        let result = dialog.begin_dialog(self, options).await?;
        Ok(self.verify(result, depth))
    }

    /// Runs the active dialog on the current turn. An empty stack is not an
    /// error; the result just reports nothing active.
    #[instrument(level = "debug", skip(self), fields(depth = self.stack_depth()))]
    pub async fn continue_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        let Some(active) = self.active_dialog() else {
            return Ok(DialogTurnResult::empty());
        };
        let dialog = self.lookup(&active.id.clone())?;
        let expected = self.stack_depth() - 1;
        let result = dialog.continue_dialog(self).await?;
        Ok(self.verify(result, expected))
    }

    /// Pops the active dialog and hands `result` to the dialog below it.
    #[instrument(level = "debug", skip(self, result), fields(depth = self.stack_depth()))]
    pub async fn end_dialog(&mut self, result: Value) -> DialogResult<DialogTurnResult> {
        let expected = self.stack_depth().saturating_sub(1);
        self.end_active_dialog(DialogReason::EndCalled).await?;

        let Some(parent) = self.active_dialog() else {
            return Ok(self.verify(DialogTurnResult::complete(result), expected));
        };
        let dialog = self.lookup(&parent.id.clone())?;
        let resumed = dialog
            .resume_dialog(self, DialogReason::EndCalled, result)
            .await?;
        Ok(self.verify(resumed, expected))
    }

    /// Swaps the active dialog for a new one without growing the stack.
    #[instrument(level = "debug", skip(self, options), fields(depth = self.stack_depth()))]
    pub async fn replace_dialog(
        &mut self,
        id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.end_active_dialog(DialogReason::ReplaceCalled).await?;
        self.begin_dialog(id, options).await
    }

    /// Pops every dialog, notifying each with [`DialogReason::Cancelled`].
    #[instrument(level = "debug", skip(self), fields(depth = self.stack_depth()))]
    pub async fn cancel_all_dialogs(&mut self) -> DialogResult<DialogTurnResult> {
        let expected = self.stack_depth();
        while !self.state.dialog_stack.is_empty() {
            self.end_active_dialog(DialogReason::Cancelled).await?;
        }
        Ok(self.verify(DialogTurnResult::empty(), expected))
    }

    /// Asks the active dialog to repeat its last prompt.
    pub async fn reprompt_dialog(&mut self) -> DialogResult<()> {
        let Some(active) = self.active_dialog() else {
            return Ok(());
        };
        let dialog = self.lookup(&active.id.clone())?;
        dialog.reprompt_dialog(self).await
    }

    pub(crate) async fn end_active_dialog(&mut self, reason: DialogReason) -> DialogResult<()> {
        let Some(instance) = self.state.dialog_stack.pop_front() else {
            return Ok(());
        };
        debug!("ending {} ({})", instance.id, reason);
        match self.dialogs.find(&instance.id).cloned() {
            Some(dialog) => dialog.end_dialog(self, &instance, reason).await,
            None => {
                warn!("ended dialog {} is not in the dialog set", instance.id);
                Ok(())
            }
        }
    }

    // The stack, not the dialog, decides what is active.
    fn verify(&self, mut result: DialogTurnResult, expected_depth: usize) -> DialogTurnResult {
        let depth = self.stack_depth();
        result.parent_ended = result.parent_ended || depth < expected_depth;
        result.has_active = depth > 0;
        if result.has_active {
            result.has_result = false;
            result.result = Value::Null;
        }
        result
    }
}

// Wraps plain text in backticks so the expression parser reads it as a
// template, escaping backslashes and backticks outside `${...}`.
fn template_source(text: &str) -> String {
    let mut source = String::with_capacity(text.len() + 2);
    source.push('`');
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if depth > 0 {
            match (quote, c) {
                (Some(_), '\\') => {
                    source.push(c);
                    if let Some(escaped) = chars.next() {
                        source.push(escaped);
                    }
                    continue;
                }
                (Some(q), _) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '{') => depth += 1,
                (None, '}') => depth -= 1,
                _ => {}
            }
            source.push(c);
            continue;
        }
        match c {
            '$' if chars.peek() == Some(&'{') => {
                source.push_str("${");
                chars.next();
                depth = 1;
            }
            '\\' | '`' => {
                source.push('\\');
                source.push(c);
            }
            _ => source.push(c),
        }
    }
    source.push('`');
    source
}
