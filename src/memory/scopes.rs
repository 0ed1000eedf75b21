//! Named memory roots.
//!
//! A scope only knows where its root object lives in a [`DialogContext`];
//! path traversal below the root is done by the registry.

use crate::dialogs::DialogContext;
use crate::eval::Value;
use crate::memory::{MemoryError, MemoryResult, CLASS, DIALOG, SETTINGS, THIS};

pub trait MemoryScope: Send + Sync {
    fn name(&self) -> &str;

    fn is_read_only(&self) -> bool {
        false
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value>;

    fn root_mut<'a>(&self, dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value>;

    fn set_root(&self, dc: &mut DialogContext, value: Value) -> MemoryResult<()> {
        *self.root_mut(dc)? = value;
        Ok(())
    }
}

fn read_only(scope: &str) -> MemoryError {
    MemoryError::ReadOnlyScope {
        scope: scope.to_string(),
    }
}

fn no_active_dialog(scope: &str) -> MemoryError {
    MemoryError::Unavailable {
        scope: scope.to_string(),
        message: "there is no active dialog".to_string(),
    }
}

/// A root object held by the dialog context for the whole turn, loaded from
/// and saved to storage by the host (`user`, `conversation`, `turn`, or any
/// host-defined name).
#[derive(Debug, Clone)]
pub struct RootMemoryScope {
    name: String,
}

impl RootMemoryScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
        }
    }
}

impl MemoryScope for RootMemoryScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value> {
        dc.memory_root(&self.name)
    }

    fn root_mut<'a>(&self, dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value> {
        Ok(dc.memory_root_mut(&self.name))
    }
}

/// Host configuration, read-only.
#[derive(Debug, Clone, Default)]
pub struct SettingsMemoryScope;

impl MemoryScope for SettingsMemoryScope {
    fn name(&self) -> &str {
        SETTINGS
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value> {
        Some(dc.settings())
    }

    fn root_mut<'a>(&self, _dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value> {
        Err(read_only(SETTINGS))
    }
}

/// State of the nearest container dialog on the stack, so the actions of a
/// sequence share one `dialog` object. Falls back to the active dialog.
#[derive(Debug, Clone, Default)]
pub struct DialogMemoryScope;

impl MemoryScope for DialogMemoryScope {
    fn name(&self) -> &str {
        DIALOG
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value> {
        let index = dc.dialog_scope_index()?;
        dc.instance(index).map(|instance| &instance.state)
    }

    fn root_mut<'a>(&self, dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value> {
        let index = dc.dialog_scope_index().ok_or_else(|| no_active_dialog(DIALOG))?;
        dc.instance_mut(index)
            .map(|instance| &mut instance.state)
            .ok_or_else(|| no_active_dialog(DIALOG))
    }
}

/// State of the active (topmost) dialog instance.
#[derive(Debug, Clone, Default)]
pub struct ThisMemoryScope;

impl MemoryScope for ThisMemoryScope {
    fn name(&self) -> &str {
        THIS
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value> {
        dc.active_dialog().map(|instance| &instance.state)
    }

    fn root_mut<'a>(&self, dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value> {
        dc.instance_mut(0)
            .map(|instance| &mut instance.state)
            .ok_or_else(|| no_active_dialog(THIS))
    }
}

/// Properties declared by a dialog definition, taken from the nearest
/// dialog on the stack that declares any. Read-only.
#[derive(Debug, Clone, Default)]
pub struct ClassMemoryScope;

impl MemoryScope for ClassMemoryScope {
    fn name(&self) -> &str {
        CLASS
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn get_root<'a>(&self, dc: &'a DialogContext) -> Option<&'a Value> {
        dc.stack()
            .dialog_stack
            .iter()
            .find_map(|instance| dc.find_dialog(&instance.id)?.class_memory())
    }

    fn root_mut<'a>(&self, _dc: &'a mut DialogContext) -> MemoryResult<&'a mut Value> {
        Err(read_only(CLASS))
    }
}
