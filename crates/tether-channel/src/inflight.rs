//! In-flight command registry.
//!
//! Callers register host commands (uploads, exports, anything that must
//! not be cut off mid-flight) so the suspension drain can hold the socket
//! open until they complete or the grace window elapses.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Registry of commands currently in flight.
pub struct InflightCommands {
    commands: Mutex<HashMap<String, String>>,
}

impl InflightCommands {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Register a command with a short display label.
    pub fn register(&self, command_id: &str, label: impl Into<String>) {
        let _ = self
            .commands
            .lock()
            .insert(command_id.to_owned(), label.into());
    }

    /// Mark a command complete. Unknown ids are a no-op.
    pub fn complete(&self, command_id: &str) {
        let _ = self.commands.lock().remove(command_id);
    }

    /// Number of commands in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

impl Default for InflightCommands {
    fn default() -> Self {
        Self::new()
    }
}
