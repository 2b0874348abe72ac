//! Persisted record shapes for the session store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a persisted conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// A user prompt (or mixed user content).
    User,
    /// An assistant response.
    Assistant,
    /// A tool result delivered back to the assistant.
    ToolResult,
}

/// One message as appended through the store contract: a role plus the
/// rendered display text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Who produced the message.
    pub role: MessageRole,
    /// Rendered display text.
    pub text: String,
}

impl MessageRecord {
    /// Create a new message record.
    #[must_use]
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A locally persisted session.
///
/// Records are created either by the UI (locally originated, placeholder
/// metadata) or by the sync engine from backend pushes. A listing entry
/// matching an existing record clears the locally-originated flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Normalized (lowercased) remote session id.
    pub remote_session_id: String,
    /// Display name.
    pub name: String,
    /// Working directory on the backend host.
    pub working_directory: String,
    /// Recency ordering timestamp; live updates advance it, history
    /// replays do not.
    pub last_modified: DateTime<Utc>,
    /// Number of persisted messages.
    pub message_count: u64,
    /// Text of the most recently appended message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Unread messages (maintained by the UI collaborator).
    pub unread_count: u64,
    /// Whether this record was created by the UI before any backend
    /// confirmation.
    pub locally_originated: bool,
    /// Soft-delete flag.
    pub deleted: bool,
}

impl SessionRecord {
    /// A placeholder record for a remote session seen in a push before any
    /// listing: empty display metadata, backend-confirmed.
    #[must_use]
    pub fn placeholder(remote_session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            remote_session_id: remote_session_id.into(),
            name: String::new(),
            working_directory: String::new(),
            last_modified: now,
            message_count: 0,
            preview: None,
            unread_count: 0,
            locally_originated: false,
            deleted: false,
        }
    }
}
