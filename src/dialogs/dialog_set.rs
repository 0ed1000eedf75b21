use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Dialog, DialogError, DialogResult};

/// The dialogs a context can start, by id.
#[derive(Clone, Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
}

impl fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogSet").field("ids", &self.ids()).finish()
    }
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `dialog` and, recursively, its dependencies. Registering the
    /// same dialog twice is a no-op; a different dialog with a taken id is
    /// an error.
    pub fn add(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<()> {
        if let Some(existing) = self.dialogs.get(dialog.id()) {
            if std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&dialog)) {
                return Ok(());
            }
            return Err(DialogError::DuplicateId {
                id: dialog.id().to_string(),
            });
        }
        debug!("registering dialog {}", dialog.id());
        self.dialogs.insert(dialog.id().to_string(), dialog.clone());
        for dependency in dialog.dependencies() {
            self.add(dependency)?;
        }
        Ok(())
    }

    pub fn with(mut self, dialog: Arc<dyn Dialog>) -> DialogResult<Self> {
        self.add(dialog)?;
        Ok(self)
    }

    pub fn find(&self, id: &str) -> Option<&Arc<dyn Dialog>> {
        self.dialogs.get(id)
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.dialogs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
