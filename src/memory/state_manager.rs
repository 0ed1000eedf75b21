use core::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::dialogs::DialogContext;
use crate::eval::{Memory, Value};
use crate::memory::{MemoryError, MemoryResult, ScopeRegistry};

/// A value offered for storage. Only `Ready` values can be written;
/// a still-running computation is rejected instead of being awaited.
pub enum StateValue {
    Ready(Value),
    Pending(BoxFuture<'static, Value>),
}

impl fmt::Debug for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            StateValue::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        StateValue::Ready(value)
    }
}

/// Read/write access to every memory scope of a dialog context.
pub struct DialogStateManager<'a> {
    registry: Arc<ScopeRegistry>,
    dc: &'a mut DialogContext,
}

impl<'a> DialogStateManager<'a> {
    pub fn new(registry: Arc<ScopeRegistry>, dc: &'a mut DialogContext) -> Self {
        Self { registry, dc }
    }

    pub fn get_value(&self, path: &str) -> MemoryResult<Option<Value>> {
        self.registry.get_value(self.dc, path)
    }

    /// Reads and converts the value at `path`; `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> MemoryResult<Option<T>> {
        let Some(value) = self.get_value(path)? else {
            return Ok(None);
        };
        serde_json::from_value(serde_json::Value::from(value))
            .map(Some)
            .map_err(|e| MemoryError::InvalidPath {
                path: path.to_string(),
                message: format!("value has the wrong shape: {}", e),
            })
    }

    pub fn set_value(&mut self, path: &str, value: impl Into<StateValue>) -> MemoryResult<()> {
        self.registry.set_value(self.dc, path, value)
    }

    pub fn remove_value(&mut self, path: &str) -> MemoryResult<bool> {
        self.registry.remove_value(self.dc, path)
    }

    pub fn snapshot(&self) -> Value {
        self.registry.snapshot(self.dc)
    }
}

/// Read-only view of a dialog context, handed to the expression evaluator.
pub struct DialogMemory<'a> {
    registry: &'a ScopeRegistry,
    dc: &'a DialogContext,
}

impl<'a> DialogMemory<'a> {
    pub fn new(registry: &'a ScopeRegistry, dc: &'a DialogContext) -> Self {
        Self { registry, dc }
    }
}

impl Memory for DialogMemory<'_> {
    fn get_value(&self, path: &str) -> MemoryResult<Option<Value>> {
        self.registry.get_value(self.dc, path)
    }
}
