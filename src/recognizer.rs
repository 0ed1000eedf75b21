//! Intent/entity recognition collaborator.
//!
//! A recognizer result is written to `turn.recognized` each turn, where the
//! `#intent`, `@entity` and `@@entity` path shorthands find it.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::eval::Value;
use crate::turn::Activity;

pub const NONE_INTENT: &str = "None";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognizerError {
    #[error("invalid pattern for intent '{intent}': {message}")]
    InvalidPattern { intent: String, message: String },
    #[error("Recognizer error: {0}")]
    Service(String),
}

pub type RecognizerResult<T> = Result<T, RecognizerError>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IntentScore {
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recognized {
    pub text: String,
    pub intents: HashMap<String, IntentScore>,
    pub entities: HashMap<String, Vec<serde_json::Value>>,
}

impl Recognized {
    /// Highest scoring intent; ties go to the alphabetically first name.
    pub fn top_intent(&self) -> Option<(&str, f64)> {
        let mut intents: Vec<_> = self.intents.iter().collect();
        intents.sort_by(|(a_name, a), (b_name, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_name.cmp(b_name))
        });
        intents
            .first()
            .map(|(name, intent)| (name.as_str(), intent.score))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self)
            .map(Value::from)
            .unwrap_or_else(|_| Value::empty_map())
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, activity: &Activity) -> RecognizerResult<Recognized>;
}

/// Matches the activity text against one regex per intent. Every matching
/// intent scores 1.0 and its named capture groups become entities. When
/// nothing matches the result holds only the `None` intent.
#[derive(Debug, Default, Clone)]
pub struct RegexRecognizer {
    intents: Vec<(String, Regex)>,
}

impl RegexRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_intent(mut self, name: impl Into<String>, pattern: &str) -> RecognizerResult<Self> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| RecognizerError::InvalidPattern {
            intent: name.clone(),
            message: e.to_string(),
        })?;
        self.intents.push((name, regex));
        Ok(self)
    }

    pub fn recognize_text(&self, text: &str) -> Recognized {
        let mut result = Recognized {
            text: text.to_string(),
            ..Default::default()
        };
        for (name, regex) in &self.intents {
            let Some(captures) = regex.captures(text) else {
                continue;
            };
            result
                .intents
                .insert(name.clone(), IntentScore { score: 1.0 });
            for group in regex.capture_names().flatten() {
                if let Some(found) = captures.name(group) {
                    result
                        .entities
                        .entry(group.to_string())
                        .or_default()
                        .push(serde_json::Value::String(found.as_str().to_string()));
                }
            }
        }
        if result.intents.is_empty() {
            result
                .intents
                .insert(NONE_INTENT.to_string(), IntentScore { score: 1.0 });
        }
        debug!("recognized {:?}", result.top_intent());
        result
    }
}

#[async_trait]
impl Recognizer for RegexRecognizer {
    async fn recognize(&self, activity: &Activity) -> RecognizerResult<Recognized> {
        Ok(self.recognize_text(activity.text()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recognizer() -> RegexRecognizer {
        RegexRecognizer::new()
            .add_intent("weather", r"weather in (?P<city>\w+)")
            .unwrap()
            .add_intent("greeting", r"(?i)^(hi|hello)\b")
            .unwrap()
    }

    #[test]
    fn test_intents_and_entities() {
        let result = recognizer().recognize_text("hello, weather in Paris?");
        assert_eq!(result.intents.len(), 2);
        assert_eq!(result.entities["city"], vec![json!("Paris")]);
        assert_eq!(result.top_intent(), Some(("greeting", 1.0)));
    }

    #[test]
    fn test_no_match_gives_none_intent() {
        let result = recognizer().recognize_text("what?");
        assert_eq!(result.top_intent(), Some((NONE_INTENT, 1.0)));
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_value_shape() {
        let value = recognizer().recognize_text("weather in Rome").to_value();
        assert_eq!(
            serde_json::Value::from(value),
            json!({
                "text": "weather in Rome",
                "intents": {"weather": {"score": 1.0}},
                "entities": {"city": ["Rome"]}
            })
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = RegexRecognizer::new().add_intent("bad", "(").unwrap_err();
        assert!(matches!(err, RecognizerError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_recognize_activity() {
        let result = recognizer()
            .recognize(&Activity::message("weather in Oslo"))
            .await
            .unwrap();
        assert!(result.intents.contains_key("weather"));
    }
}
