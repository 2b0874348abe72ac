//! In-memory session store.
//!
//! The reference [`SessionStore`] implementation: mutex-guarded maps, used
//! by tests and by embedders that have not wired a durable store yet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::record::{MessageRecord, SessionRecord};
use crate::store::{Result, SessionStore};

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
}

/// Mutex-guarded in-memory implementation of [`SessionStore`].
pub struct MemorySessionStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    /// Create a store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Snapshot a session record (test/introspection accessor).
    #[must_use]
    pub fn session(&self, remote_session_id: &str) -> Option<SessionRecord> {
        self.state.lock().sessions.get(remote_session_id).cloned()
    }

    /// Snapshot the messages of a session (test/introspection accessor).
    #[must_use]
    pub fn messages(&self, remote_session_id: &str) -> Vec<MessageRecord> {
        self.state
            .lock()
            .messages
            .get(remote_session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_session(&self, remote_session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.state.lock().sessions.get(remote_session_id).cloned())
    }

    async fn upsert_session(&self, record: SessionRecord) -> Result<()> {
        let mut state = self.state.lock();
        let _ = state
            .sessions
            .insert(record.remote_session_id.clone(), record);
        Ok(())
    }

    async fn append_messages(
        &self,
        remote_session_id: &str,
        messages: Vec<MessageRecord>,
        advance_timestamp: bool,
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let mut state = self.state.lock();
        let record = state
            .sessions
            .entry(remote_session_id.to_owned())
            .or_insert_with(|| SessionRecord::placeholder(remote_session_id, now));
        record.message_count += messages.len() as u64;
        record.preview = messages.last().map(|m| m.text.clone());
        if advance_timestamp {
            record.last_modified = now;
        }
        state
            .messages
            .entry(remote_session_id.to_owned())
            .or_default()
            .extend(messages);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.messages.clear();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
