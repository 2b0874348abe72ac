//! Per-remote-session turn locks.
//!
//! A lock is taken optimistically at the moment a prompt is sent, before
//! any server acknowledgment, and released only by `turn_complete` or an
//! `error` carrying the session id — never by intermediate traffic, since
//! a single turn may emit many messages while the backend executes tools.
//!
//! Matching is exact string equality on whatever id the caller supplies.
//! Callers are expected to pass consistently-cased (normalized) ids; a
//! lock taken under one casing and released under another stays held.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

/// Tracks which remote sessions have a turn in flight.
pub struct SessionLockRegistry {
    locked: Mutex<HashSet<String>>,
}

impl SessionLockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(HashSet::new()),
        }
    }

    /// Lock a session. Idempotent; returns `true` if it was newly locked.
    pub fn lock(&self, remote_session_id: &str) -> bool {
        let inserted = self.locked.lock().insert(remote_session_id.to_owned());
        if inserted {
            debug!(remote_session_id, "session locked");
        }
        inserted
    }

    /// Unlock a session. A no-op for ids that were never locked, which
    /// defends against duplicate or out-of-order `turn_complete`.
    /// Returns `true` if a lock was released.
    pub fn unlock(&self, remote_session_id: &str) -> bool {
        let removed = self.locked.lock().remove(remote_session_id);
        if removed {
            debug!(remote_session_id, "session unlocked");
        }
        removed
    }

    /// Whether a session currently holds a lock.
    #[must_use]
    pub fn is_locked(&self, remote_session_id: &str) -> bool {
        self.locked.lock().contains(remote_session_id)
    }

    /// Drop every lock — in-flight locks cannot be trusted against a dead
    /// connection.
    pub fn clear(&self) {
        let mut locked = self.locked.lock();
        if !locked.is_empty() {
            debug!(count = locked.len(), "clearing session locks");
            locked.clear();
        }
    }

    /// Number of held locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locked.lock().len()
    }

    /// Whether no locks are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locked.lock().is_empty()
    }
}

impl Default for SessionLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
