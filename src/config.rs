use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Exposed read-only through the `settings` scope.
    #[serde(default = "default_settings")]
    pub settings: serde_json::Value,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub expression: ExpressionConfig,

    #[serde(default)]
    pub dialogs: DialogConfig,

    /// Bound on each storage round trip made by the turn entry point.
    #[serde(default = "default_storage_timeout", with = "duration_ms")]
    pub storage_timeout: Duration,

    /// Sent to the user when a turn fails with a recoverable error.
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings: default_settings(),
            state: StateConfig::default(),
            expression: ExpressionConfig::default(),
            dialogs: DialogConfig::default(),
            storage_timeout: default_storage_timeout(),
            error_message: default_error_message(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    pub fn from_str(s: &str) -> InternalResult<Self> {
        from_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_conversation_prefix")]
    pub conversation_prefix: String,

    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,

    /// Skip e-tag checks when writing state back.
    #[serde(default)]
    pub last_writer_wins: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            conversation_prefix: default_conversation_prefix(),
            user_prefix: default_user_prefix(),
            last_writer_wins: false,
        }
    }
}

impl StateConfig {
    pub fn conversation_key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.conversation_prefix, conversation_id)
    }

    pub fn dialog_state_key(&self, conversation_id: &str) -> String {
        format!("{}{}/dialogState", self.conversation_prefix, conversation_id)
    }

    pub fn user_key(&self, user_id: &str) -> String {
        format!("{}{}", self.user_prefix, user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_true(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    #[serde(default = "default_max_stack_depth")]
    pub max_stack_depth: usize,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: default_max_stack_depth(),
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_settings() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
fn default_storage_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_error_message() -> String {
    "Sorry, something went wrong.".to_string()
}
fn default_conversation_prefix() -> String {
    "conversation/".to_string()
}
fn default_user_prefix() -> String {
    "user/".to_string()
}
fn default_true() -> bool {
    true
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_max_stack_depth() -> usize {
    64
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
