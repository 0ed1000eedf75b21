use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::{DialogContext, DialogResult};
use crate::eval::Value;

/// Why a dialog is being resumed or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
pub enum DialogReason {
    BeginCalled,
    ContinueCalled,
    EndCalled,
    ReplaceCalled,
    Cancelled,
    NextCalled,
}

/// One running dialog on the stack. `state` is private to this instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    pub id: String,
    #[serde(default = "Value::empty_map")]
    pub state: Value,
}

impl DialogInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Value::empty_map(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.property(key)
    }

    pub fn get_index(&self, key: &str) -> usize {
        self.get(key)
            .and_then(Value::as_i64)
            .map_or(0, |index| index.max(0) as usize)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.state.as_map().is_none() {
            self.state = Value::empty_map();
        }
        if let Some(map) = self.state.as_map_mut() {
            map.insert(key.into(), value.into());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.as_map_mut()?.remove(key)
    }
}

/// The persisted part of a conversation's dialogs. The front of the stack is
/// the active dialog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogState {
    #[serde(default)]
    pub dialog_stack: VecDeque<DialogInstance>,
}

impl DialogState {
    pub fn depth(&self) -> usize {
        self.dialog_stack.len()
    }
}

/// Outcome of a stack transition.
///
/// Only the constructors below and the context's post-transition check build
/// these, so the flags never disagree with the stack.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DialogTurnResult {
    pub(crate) has_active: bool,
    pub(crate) has_result: bool,
    pub(crate) result: Value,
    pub(crate) parent_ended: bool,
}

impl DialogTurnResult {
    /// The active dialog is waiting for the next turn.
    pub fn waiting() -> Self {
        Self {
            has_active: true,
            ..Default::default()
        }
    }

    pub fn complete(result: Value) -> Self {
        Self {
            has_active: false,
            has_result: !result.is_null(),
            result,
            parent_ended: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_active(&self) -> bool {
        self.has_active
    }

    pub fn has_result(&self) -> bool {
        self.has_result
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn into_result(self) -> Value {
        self.result
    }

    /// Set when the transition ended dialogs that were on the stack before
    /// it started, e.g. an action ending its enclosing sequence.
    pub fn parent_ended(&self) -> bool {
        self.parent_ended
    }
}

/// A unit of conversational logic that can be pushed onto the stack.
///
/// Only `begin_dialog` is required. The defaults end the dialog on
/// `continue`, pass a child's result straight up on `resume`, and ignore
/// `reprompt` and the end notification.
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> &str;

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult>;

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(Value::Null).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        result: Value,
    ) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(result).await
    }

    async fn reprompt_dialog(&self, _dc: &mut DialogContext) -> DialogResult<()> {
        Ok(())
    }

    /// Called after `instance` has been popped off the stack.
    async fn end_dialog(
        &self,
        _dc: &mut DialogContext,
        _instance: &DialogInstance,
        _reason: DialogReason,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Containers own the `dialog` memory scope of the dialogs they start.
    fn is_container(&self) -> bool {
        false
    }

    /// Read-only properties exposed through the `class` scope while this
    /// dialog is active.
    fn class_memory(&self) -> Option<&Value> {
        None
    }

    /// Dialogs this one starts by id; registered along with it.
    fn dependencies(&self) -> Vec<Arc<dyn Dialog>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_dialog_state_round_trip_keeps_order_and_state() {
        let mut top = DialogInstance::new("prompt");
        top.set("attempts", 2);
        let mut bottom = DialogInstance::new("root");
        bottom.set("stepIndex", 1);
        let state = DialogState {
            dialog_stack: VecDeque::from(vec![top, bottom]),
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            json!({"dialogStack": [
                {"id": "prompt", "state": {"attempts": 2}},
                {"id": "root", "state": {"stepIndex": 1}}
            ]})
        );
        let restored: DialogState = serde_json::from_value(json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_turn_result_constructors() {
        assert!(DialogTurnResult::waiting().has_active());
        let done = DialogTurnResult::complete(Value::from(3));
        assert!(done.has_result());
        assert_eq!(done.result(), &Value::Integer(3));
        assert!(!DialogTurnResult::complete(Value::Null).has_result());
        assert_eq!(DialogTurnResult::empty(), DialogTurnResult::default());
    }

    #[test]
    fn test_instance_index_defaults_to_zero() {
        let mut instance = DialogInstance::new("x");
        assert_eq!(instance.get_index("_index"), 0);
        instance.set("_index", 4);
        assert_eq!(instance.get_index("_index"), 4);
    }
}
