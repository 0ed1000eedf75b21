//! Key/value persistence for conversation and user state.
//!
//! Items carry an e-tag for optimistic concurrency. A write whose tag is
//! `None` or `"*"` always succeeds; any other tag must match the stored one.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

pub const ANY_ETAG: &str = "*";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("e-tag conflict writing '{key}'")]
    ETagConflict { key: String },
    #[error("storage keys must not be empty")]
    InvalidKey,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreItem {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

impl StoreItem {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value, e_tag: None }
    }

    pub fn with_e_tag(mut self, e_tag: impl Into<String>) -> Self {
        self.e_tag = Some(e_tag.into());
        self
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the items that exist; missing keys are simply absent.
    async fn read(&self, keys: &[String]) -> StorageResult<HashMap<String, StoreItem>>;

    /// Writes all changes or none of them.
    async fn write(&self, changes: HashMap<String, StoreItem>) -> StorageResult<()>;

    async fn delete(&self, keys: &[String]) -> StorageResult<()>;
}

/// Process-local storage. Every successful write stamps a fresh e-tag.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, StoreItem>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check(&self, key: &str, item: &StoreItem) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey);
        }
        let Some(requested) = item.e_tag.as_deref() else {
            return Ok(());
        };
        if requested == ANY_ETAG {
            return Ok(());
        }
        match self.items.get(key) {
            Some(stored) if stored.e_tag.as_deref() != Some(requested) => {
                Err(StorageError::ETagConflict {
                    key: key.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String]) -> StorageResult<HashMap<String, StoreItem>> {
        let mut found = HashMap::new();
        for key in keys {
            if key.is_empty() {
                return Err(StorageError::InvalidKey);
            }
            if let Some(item) = self.items.get(key) {
                found.insert(key.clone(), item.clone());
            }
        }
        Ok(found)
    }

    #[instrument(level = "debug", skip(self, changes), fields(count = changes.len()))]
    async fn write(&self, changes: HashMap<String, StoreItem>) -> StorageResult<()> {
        for (key, item) in &changes {
            self.check(key, item)?;
        }
        for (key, mut item) in changes {
            item.e_tag = Some(Uuid::new_v4().to_string());
            debug!("stored {}", key);
            self.items.insert(key, item);
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.items.remove(key);
        }
        Ok(())
    }
}
