//! Cancellable reconnect timer.
//!
//! At most one reconnect is pending at a time; scheduling replaces (and
//! cancels) any earlier pending attempt so stacked timers cannot each fire
//! a connect. `disconnect`, `force_reconnect`, and `update_endpoint` all
//! cancel through here before touching the socket.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owns the single pending reconnect task.
pub struct ReconnectScheduler {
    pending: Mutex<Option<CancellationToken>>,
}

impl ReconnectScheduler {
    /// Create a scheduler with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Schedule `task` to run after `delay`, replacing any pending attempt.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        if let Some(previous) = self.pending.lock().replace(token) {
            previous.cancel();
        }
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {
                    debug!("pending reconnect cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    task.await;
                    // Mark the slot as consumed so is_pending() goes false.
                    guard.cancel();
                }
            }
        });
    }

    /// Cancel any pending attempt.
    pub fn cancel(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
        }
    }

    /// Whether an attempt is scheduled and has neither fired nor been
    /// cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Default for ReconnectScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
