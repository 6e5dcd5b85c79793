//! One-off overrides on a device command line.
//!
//! `show version //display csv //color off` sends `show version` with the
//! display and color changed for that line only. The overrides run against
//! an overlay: a session copying the parent's settings by value while
//! sharing its buffers, inventory, accessor and ledger slot.

use std::sync::Arc;

use tracing::debug;

use super::Session;
use crate::registry::{Outcome, Registry};

impl Session {
    /// Overlay session for one inline line.
    ///
    /// Only inline-capable base commands are registered on the overlay, so
    /// inventory filters and non-inline commands stay in the line's body.
    pub fn overlay(&self) -> Self {
        let mut registry = super::commands::base_registry(&self.defaults);
        registry.inline_only();

        Self {
            defaults: self.defaults.clone(),
            settings: self.settings.clone(),
            registry: Arc::new(registry),
            buffers: self.buffers.clone(),
            inventory: Arc::clone(&self.inventory),
            accessor: Arc::clone(&self.accessor),
            terminal: Arc::clone(&self.terminal),
            ledger: Arc::clone(&self.ledger),
            drain: Arc::clone(&self.drain),
            progress: self.progress.clone(),
            playback: self.playback.clone(),
        }
    }

    /// Runs `line` through an overlay when it carries inline overrides.
    ///
    /// Returns false when the line has none, leaving it to the caller.
    /// Pending device commands are flushed first so ordering is preserved.
    /// A failing override abandons the line with a warning.
    pub(super) fn run_inline(&mut self, line: &str, pending: &mut Vec<String>) -> bool {
        let mut overlay = self.overlay();
        let split = match overlay.registry.extract_inline_commands(line) {
            Ok(split) => split,
            Err(e) => {
                debug!(error = %e, "Inline extraction failed");
                return false;
            }
        };
        if split.is_plain() && split.body == line {
            return false;
        }

        self.flush(pending);
        debug!(body = %split.body, overrides = ?split.overrides, "Inline overrides");

        let registry: Arc<Registry<Self>> = Arc::clone(&overlay.registry);
        for text in &split.overrides {
            let result = registry
                .canonicalize(text)
                .and_then(|invocation| registry.exec(&mut overlay, &invocation));
            match result {
                Ok(Outcome::Message(message)) => overlay.print_system(&message),
                Ok(Outcome::Done | Outcome::Exit) => {}
                Err(e) => {
                    overlay.print_warning(&e.to_string());
                    return true;
                }
            }
        }

        overlay.dispatch(&[split.body], false);
        true
    }
}
