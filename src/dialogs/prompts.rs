use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Dialog, DialogContext, DialogResult, DialogTurnResult};
use crate::eval::Value;

const PROMPT: &str = "prompt";
const RETRY_PROMPT: &str = "retryPrompt";
const OPTIONS: &str = "options";
const ATTEMPTS: &str = "attempts";

/// Turns the user's reply into a value, or rejects it.
pub trait PromptInput: Send + Sync + 'static {
    fn recognize(text: &str) -> Option<Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextInput;

impl PromptInput for TextInput {
    fn recognize(text: &str) -> Option<Value> {
        let text = text.trim();
        (!text.is_empty()).then(|| Value::from(text))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberInput;

impl PromptInput for NumberInput {
    fn recognize(text: &str) -> Option<Value> {
        let text = text.trim();
        if let Ok(integer) = text.parse::<i64>() {
            return Some(Value::Integer(integer));
        }
        text.parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(Value::Float)
    }
}

pub type PromptValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Asks a question and waits until the reply is recognized and accepted by
/// the validator, then ends with the recognized value.
///
/// The prompt texts are templates and may be overridden per call through
/// `prompt`/`retryPrompt` keys in the begin options. They are also exposed
/// as `%prompt` and `%retryPrompt`.
pub struct Prompt<K> {
    id: String,
    properties: Value,
    validator: Option<PromptValidator>,
    _input: PhantomData<fn() -> K>,
}

pub type TextPrompt = Prompt<TextInput>;
pub type NumberPrompt = Prompt<NumberInput>;

impl<K> fmt::Debug for Prompt<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl<K: PromptInput> Prompt<K> {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(PROMPT.to_string(), Value::String(prompt.into()));
        Self {
            id: id.into(),
            properties: Value::Map(properties),
            validator: None,
            _input: PhantomData,
        }
    }

    pub fn with_retry_prompt(mut self, retry_prompt: impl Into<String>) -> Self {
        if let Some(map) = self.properties.as_map_mut() {
            map.insert(RETRY_PROMPT.to_string(), Value::String(retry_prompt.into()));
        }
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    fn text_for(&self, dc: &DialogContext, key: &str) -> Option<String> {
        let from_options = dc
            .active_dialog()
            .and_then(|instance| instance.get(OPTIONS))
            .and_then(|options| options.property(key))
            .and_then(Value::as_str);
        from_options
            .or_else(|| self.properties.property(key).and_then(Value::as_str))
            .map(str::to_string)
    }

    async fn send_prompt(&self, dc: &DialogContext, retry: bool) -> DialogResult<()> {
        let text = if retry {
            self.text_for(dc, RETRY_PROMPT)
                .or_else(|| self.text_for(dc, PROMPT))
        } else {
            self.text_for(dc, PROMPT)
        };
        if let Some(text) = text {
            let rendered = dc.evaluate_template(&text)?;
            dc.send_text(rendered).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<K: PromptInput> Dialog for Prompt<K> {
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
            instance.set(ATTEMPTS, 0);
        }
        self.send_prompt(dc, false).await?;
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let recognized = K::recognize(dc.turn().activity().text()).filter(|value| {
            self.validator
                .as_ref()
                .map_or(true, |validator| validator(value))
        });
        if let Some(value) = recognized {
            return dc.end_dialog(value).await;
        }

        if let Some(instance) = dc.instance_mut(0) {
            let attempts = instance.get_index(ATTEMPTS) + 1;
            debug!("prompt {} rejected input, attempt {}", instance.id, attempts);
            instance.set(ATTEMPTS, attempts);
        }
        self.send_prompt(dc, true).await?;
        Ok(DialogTurnResult::waiting())
    }

    async fn reprompt_dialog(&self, dc: &mut DialogContext) -> DialogResult<()> {
        self.send_prompt(dc, false).await
    }

    fn class_memory(&self) -> Option<&Value> {
        Some(&self.properties)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::dialogs::{DialogSet, DialogState};
    use crate::turn::{Activity, BufferedAdapter, TurnContext};

    struct Harness {
        dialogs: Arc<DialogSet>,
        state: DialogState,
    }

    impl Harness {
        fn new(dialog: Arc<dyn Dialog>) -> Self {
            Self {
                dialogs: Arc::new(DialogSet::new().with(dialog).unwrap()),
                state: DialogState::default(),
            }
        }

        async fn say(&mut self, text: &str, begin: Option<Value>) -> (DialogTurnResult, Vec<String>) {
            let adapter = Arc::new(BufferedAdapter::new());
            let turn = Arc::new(TurnContext::new(adapter.clone(), Activity::message(text)));
            let mut dc = DialogContext::new(
                self.dialogs.clone(),
                turn,
                std::mem::take(&mut self.state),
            )
            .with_memory("user", Value::from(json!({"name": "Ann"})));
            let result = if dc.stack_depth() == 0 {
                let id = self.dialogs.ids()[0].to_string();
                dc.begin_dialog(&id, begin).await.unwrap()
            } else {
                dc.continue_dialog().await.unwrap()
            };
            self.state = dc.into_parts().0;
            let sent = adapter
                .take()
                .await
                .iter()
                .map(|activity| activity.text().to_string())
                .collect();
            (result, sent)
        }
    }

    #[test]
    fn test_input_recognition() {
        assert_eq!(TextInput::recognize("  hi "), Some(Value::from("hi")));
        assert_eq!(TextInput::recognize("   "), None);
        assert_eq!(NumberInput::recognize("42"), Some(Value::Integer(42)));
        assert_eq!(NumberInput::recognize("-2.5"), Some(Value::Float(-2.5)));
        assert_eq!(NumberInput::recognize("many"), None);
        assert_eq!(NumberInput::recognize("NaN"), None);
    }

    #[tokio::test]
    async fn test_number_prompt_retries_until_valid() {
        let prompt = NumberPrompt::new("age", "How old are you, ${user.name}?")
            .with_retry_prompt("A number between 1 and 120, please.")
            .with_validator(|value| value.as_f64().is_some_and(|n| (1.0..=120.0).contains(&n)));
        let mut harness = Harness::new(Arc::new(prompt));

        let (result, sent) = harness.say("hi", None).await;
        assert!(result.has_active());
        assert_eq!(sent, vec!["How old are you, Ann?"]);

        let (result, sent) = harness.say("old", None).await;
        assert!(result.has_active());
        assert_eq!(sent, vec!["A number between 1 and 120, please."]);

        let (_, sent) = harness.say("500", None).await;
        assert_eq!(sent, vec!["A number between 1 and 120, please."]);
        assert_eq!(harness.state.dialog_stack[0].get_index(ATTEMPTS), 2);

        let (result, sent) = harness.say("31", None).await;
        assert!(sent.is_empty());
        assert!(result.has_result());
        assert_eq!(result.result(), &Value::Integer(31));
        assert_eq!(harness.state.depth(), 0);
    }

    #[tokio::test]
    async fn test_options_override_prompt_text() {
        let prompt = TextPrompt::new("name", "Name?");
        let mut harness = Harness::new(Arc::new(prompt));
        let options = Value::from(json!({"prompt": "Who are you?"}));
        let (_, sent) = harness.say("hi", Some(options)).await;
        assert_eq!(sent, vec!["Who are you?"]);

        // Without a retry prompt the prompt is repeated.
        let (_, sent) = harness.say("  ", None).await;
        assert_eq!(sent, vec!["Who are you?"]);
    }

    #[tokio::test]
    async fn test_class_memory_exposes_prompt() {
        let prompt = TextPrompt::new("name", "Name?").with_retry_prompt("Again?");
        let dialogs = Arc::new(DialogSet::new().with(Arc::new(prompt)).unwrap());
        let adapter = Arc::new(BufferedAdapter::new());
        let turn = Arc::new(TurnContext::new(adapter, Activity::message("x")));
        let mut dc = DialogContext::new(dialogs, turn, DialogState::default());
        dc.begin_dialog("name", None).await.unwrap();
        assert_eq!(dc.evaluate("%retryPrompt").unwrap(), Value::from("Again?"));
        assert!(dc.state().set_value("%prompt", Value::from("x")).is_err());

        dc.reprompt_dialog().await.unwrap();
        assert_eq!(dc.stack_depth(), 1);
    }
}
