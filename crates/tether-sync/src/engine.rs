//! The sync engine: applies backend pushes to the session store.
//!
//! All remote ids are normalized to lowercase before any store access.
//! Summary, system, and queue bookkeeping messages are filtered out before
//! counting or persisting.

use std::sync::Arc;

use tracing::{debug, warn};

use tether_core::content::ConversationMessage;
use tether_core::protocol::SessionEntry;

use crate::clock::Clock;
use crate::record::{MessageRecord, MessageRole, SessionRecord};
use crate::render::{MessageClass, classify, render};
use crate::store::{Result, SessionStore};

/// Applies the live-update, history-replay, list-sync, creation, and reset
/// write paths to a [`SessionStore`].
pub struct SyncEngine {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    /// Create an engine over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Apply a `session_updated` push: append the kept messages and advance
    /// the session's recency.
    ///
    /// A push for a remote id with no local record creates a placeholder
    /// first — updates can race ahead of a listing sync and must not lose
    /// messages. Returns the number of messages appended.
    pub async fn apply_live_update(
        &self,
        remote_session_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<usize> {
        self.apply_batch(remote_session_id, messages, true).await
    }

    /// Apply a `session_history` backfill: append the kept messages without
    /// touching last-modified, preserving directory ordering.
    pub async fn apply_history(
        &self,
        remote_session_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<usize> {
        self.apply_batch(remote_session_id, messages, false).await
    }

    async fn apply_batch(
        &self,
        remote_session_id: &str,
        messages: &[ConversationMessage],
        advance_timestamp: bool,
    ) -> Result<usize> {
        let id = remote_session_id.to_lowercase();
        let records = filter_and_render(messages);
        if records.is_empty() {
            debug!(remote_session_id = %id, total = messages.len(), "batch had no persistable messages");
            return Ok(0);
        }
        if self.store.find_session(&id).await?.is_none() {
            debug!(remote_session_id = %id, "creating placeholder for unseen session");
            self.store
                .upsert_session(SessionRecord::placeholder(id.clone(), self.clock.now()))
                .await?;
        }
        let appended = records.len();
        self.store
            .append_messages(&id, records, advance_timestamp)
            .await?;
        debug!(remote_session_id = %id, appended, advance_timestamp, "applied message batch");
        Ok(appended)
    }

    /// Apply a `session_list` sync: upsert display metadata for every
    /// listed session and clear the locally-originated flag on matches.
    /// Local records absent from the listing are left untouched.
    pub async fn apply_session_list(&self, entries: &[SessionEntry]) -> Result<()> {
        for entry in entries {
            let Some(id) = entry.id.as_deref() else {
                debug!("session_list entry without id skipped");
                continue;
            };
            let id = id.to_lowercase();
            let record = match self.store.find_session(&id).await? {
                Some(mut existing) => {
                    if let Some(name) = &entry.name {
                        existing.name.clone_from(name);
                    }
                    if let Some(dir) = &entry.working_directory {
                        existing.working_directory.clone_from(dir);
                    }
                    if let Some(modified) = entry.last_modified {
                        existing.last_modified = modified;
                    }
                    // The backend knows this session now
                    existing.locally_originated = false;
                    existing
                }
                None => self.record_from_entry(&id, entry),
            };
            self.store.upsert_session(record).await?;
        }
        debug!(entries = entries.len(), "applied session list sync");
        Ok(())
    }

    /// Apply a `session_created` push: insert a record with full metadata
    /// if none exists. A payload without an id is ignored.
    pub async fn apply_session_created(&self, entry: &SessionEntry) -> Result<()> {
        let Some(id) = entry.id.as_deref() else {
            warn!("session_created without id ignored");
            return Ok(());
        };
        let id = id.to_lowercase();
        if self.store.find_session(&id).await?.is_some() {
            debug!(remote_session_id = %id, "session_created for known session, keeping existing record");
            return Ok(());
        }
        self.store
            .upsert_session(self.record_from_entry(&id, entry))
            .await?;
        debug!(remote_session_id = %id, "created session from push");
        Ok(())
    }

    /// Delete every local record and its messages — used on backend
    /// endpoint change to prevent cross-backend history mixing.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await?;
        debug!("cleared all local session state");
        Ok(())
    }

    fn record_from_entry(&self, normalized_id: &str, entry: &SessionEntry) -> SessionRecord {
        SessionRecord {
            remote_session_id: normalized_id.to_owned(),
            name: entry.name.clone().unwrap_or_default(),
            working_directory: entry.working_directory.clone().unwrap_or_default(),
            last_modified: entry.last_modified.unwrap_or_else(|| self.clock.now()),
            message_count: entry.message_count.unwrap_or(0),
            preview: entry.preview.clone(),
            unread_count: 0,
            locally_originated: false,
            deleted: false,
        }
    }
}

/// Keep only user/assistant/tool-result messages, rendered for display.
fn filter_and_render(messages: &[ConversationMessage]) -> Vec<MessageRecord> {
    messages
        .iter()
        .filter_map(|message| {
            let class = classify(message)?;
            let role = match class {
                MessageClass::User => MessageRole::User,
                MessageClass::Assistant => MessageRole::Assistant,
                MessageClass::ToolResult => MessageRole::ToolResult,
                MessageClass::Summary | MessageClass::System | MessageClass::QueueOperation => {
                    return None;
                }
            };
            Some(MessageRecord::new(role, render(message)))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
