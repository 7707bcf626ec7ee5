// Dialog registry

use std::collections::HashMap;
use std::sync::Arc;

use super::{Dialog, DialogError, DialogResult};

/// Dialogs addressable by id from one dialog context
#[derive(Clone, Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog. Ids must be unique within the set.
    pub fn add(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<()> {
        let id = dialog.id().to_string();
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::DuplicateDialog(id));
        }
        self.dialogs.insert(id, dialog);
        Ok(())
    }

    /// Register a dialog unless this exact dialog is already present.
    /// A different dialog under the same id is still an error.
    pub fn add_shared(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<()> {
        match self.dialogs.get(dialog.id()) {
            Some(existing) if Arc::ptr_eq(existing, &dialog) => Ok(()),
            _ => self.add(dialog),
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        self.dialogs.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dialogs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}

impl std::fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.dialogs.keys().collect();
        ids.sort();
        f.debug_struct("DialogSet").field("dialogs", &ids).finish()
    }
}
