//! Named text buffers shared between a session and its inline overlays.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CommandError, Result};

/// Named, append-only text buffers.
///
/// Cloning yields a handle to the same buffers.
#[derive(Debug, Clone, Default)]
pub struct Buffers {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Buffers {
    /// Empty buffer store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` to buffer `name` on a new line.
    ///
    /// An empty name or empty text is silently ignored.
    pub fn append(&self, name: &str, text: &str) {
        if name.is_empty() || text.is_empty() {
            return;
        }
        let mut buffers = self.inner.lock();
        let content = buffers.entry(name.to_string()).or_default();
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(text);
    }

    /// Appends to the buffer named by `name`, if any.
    pub fn append_opt(&self, name: Option<&str>, text: &str) {
        if let Some(name) = name {
            self.append(name, text);
        }
    }

    /// Deletes buffer `name`. Returns whether it existed.
    pub fn clear(&self, name: &str) -> bool {
        self.inner.lock().remove(name).is_some()
    }

    /// Content of buffer `name`.
    ///
    /// # Errors
    ///
    /// [`CommandError::Value`] if the buffer does not exist.
    pub fn get(&self, name: &str) -> Result<String> {
        self.inner
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::value(format!("No Buffer: {name:?}.")))
    }

    /// Names of buffers in use, sorted and space separated.
    pub fn list(&self) -> String {
        self.inner
            .lock()
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
