//! The persistence collaborator contract.
//!
//! The channel subsystem does not own storage internals; it consumes them
//! through [`SessionStore`]. The contract is eventual and at-least-once —
//! implementations may defer writes internally and no synchronous
//! read-after-write guarantee is assumed by the sync engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{MessageRecord, SessionRecord};

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Backend-specific failure (I/O, serialization, ...).
    #[error("store error: {0}")]
    Internal(String),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The upsert/append/clear contract consumed by the sync engine.
///
/// All ids are the normalized (lowercased) remote session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session record.
    async fn find_session(&self, remote_session_id: &str) -> Result<Option<SessionRecord>>;

    /// Insert or replace a session record.
    async fn upsert_session(&self, record: SessionRecord) -> Result<()>;

    /// Append messages to a session.
    ///
    /// Implementations update the message count and preview; when
    /// `advance_timestamp` is set, last-modified moves to now.
    async fn append_messages(
        &self,
        remote_session_id: &str,
        messages: Vec<MessageRecord>,
        advance_timestamp: bool,
    ) -> Result<()>;

    /// Delete every session record and its messages together.
    async fn clear_all(&self) -> Result<()>;
}
