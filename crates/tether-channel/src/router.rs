//! Per-logical-session response delivery.
//!
//! The router holds exactly one registered handler and no per-session
//! queues; ordering and isolation come purely from tagging each delivery
//! with its origin logical session id, passed through unmodified — empty
//! string included.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

type Handler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Delivers response text to the caller-supplied per-session callback.
pub struct MessageRouter {
    handler: Mutex<Option<Handler>>,
}

impl MessageRouter {
    /// Create a router with no handler registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    /// Register (or replace) the message handler.
    pub fn set_handler(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Remove the registered handler.
    pub fn clear_handler(&self) {
        *self.handler.lock() = None;
    }

    /// Deliver a message tagged with its logical session id.
    pub fn deliver(&self, text: &str, logical_session_id: &str) {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(text, logical_session_id),
            None => debug!(logical_session_id, "no handler registered, dropping message"),
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
