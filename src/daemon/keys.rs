use std::collections::HashMap;

use crate::config::KeyBinding;
use crate::models::KeyAction;

/// Key index → action lookup built from the configured bindings.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    bindings: HashMap<u8, KeyAction>,
}

impl KeyMap {
    /// Later bindings for the same index win.
    pub fn new(bindings: &[KeyBinding]) -> Self {
        Self {
            bindings: bindings.iter().map(|b| (b.index, b.action)).collect(),
        }
    }

    pub fn action(&self, index: u8) -> Option<KeyAction> {
        self.bindings.get(&index).copied()
    }
}
