//! Live-push subscription bookkeeping.
//!
//! Set semantics make subscribe/unsubscribe idempotent. Ids are normalized
//! to lowercase on entry. The set survives socket loss so subscriptions can
//! be replayed after the next successful handshake.

use std::collections::HashSet;

use parking_lot::Mutex;

/// The set of remote sessions currently receiving live pushes.
pub struct SubscriptionSet {
    active: Mutex<HashSet<String>>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Add a subscription. Returns `true` if it was newly added.
    pub fn insert(&self, remote_session_id: &str) -> bool {
        self.active.lock().insert(remote_session_id.to_lowercase())
    }

    /// Remove a subscription. Returns `true` if it was present.
    pub fn remove(&self, remote_session_id: &str) -> bool {
        self.active.lock().remove(&remote_session_id.to_lowercase())
    }

    /// Whether a session is subscribed.
    #[must_use]
    pub fn contains(&self, remote_session_id: &str) -> bool {
        self.active.lock().contains(&remote_session_id.to_lowercase())
    }

    /// Snapshot of all subscribed ids, for resubscription after reconnect.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().iter().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether no subscriptions are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new()
    }
}
