//! Wire protocol envelopes.
//!
//! One JSON object per WebSocket frame, discriminated by a `kind` field.
//! The vocabulary is fixed and small; a frame whose `kind` is unrecognized
//! (or whose required fields are missing) fails to decode and is dropped by
//! the channel with a logged warning — never partially applied.
//!
//! Field names are camelCase on the wire to match what the backend and the
//! mobile client already speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ConversationMessage;
use crate::errors::{ProtocolError, Result};

/// A session listing entry as pushed by `session_list` / `session_created`.
///
/// Every field is optional on the wire; a `session_created` payload without
/// an `id` is ignored downstream rather than rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEntry {
    /// Remote session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Working directory on the backend host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Last activity timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Message count as known to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    /// Preview text for list display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// The message carried inside a `replay` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMessage {
    /// Response text.
    pub text: String,
    /// Remote session the response belongs to.
    pub remote_session_id: String,
    /// Logical session the response is routed to.
    pub logical_session_id: String,
}

/// All envelope kinds, client→server and server→client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Server greeting after socket open.
    Hello {
        /// Server protocol version.
        protocol_version: u32,
        /// Server auth scheme version.
        auth_version: u32,
    },
    /// Client authentication request, sent in response to `hello`.
    Connect {
        /// The client's logical session id.
        logical_session_id: String,
        /// Shared credential.
        credential: String,
    },
    /// Server acknowledgment that authentication succeeded.
    Connected {
        /// Echo of the client's logical session id.
        logical_session_id: String,
    },
    /// Authentication was rejected.
    AuthError {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// Prompt submission.
    Prompt {
        /// Prompt text.
        text: String,
        /// Target remote session; absent to start a new one.
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_session_id: Option<String>,
        /// Originating logical session.
        logical_session_id: String,
        /// Working directory for a new session.
        working_directory: String,
    },
    /// Assistant response text.
    Response {
        /// Response text.
        text: String,
        /// Remote session that produced it.
        remote_session_id: String,
        /// Logical session to route to.
        logical_session_id: String,
    },
    /// Operation failure, optionally scoped to a remote session.
    Error {
        /// Failure reason.
        reason: String,
        /// Remote session whose turn failed, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_session_id: Option<String>,
    },
    /// Begin receiving live pushes for a remote session.
    Subscribe {
        /// Target remote session.
        remote_session_id: String,
    },
    /// Stop receiving live pushes for a remote session.
    Unsubscribe {
        /// Target remote session.
        remote_session_id: String,
    },
    /// Full session listing sync.
    SessionList {
        /// All sessions known to the backend.
        entries: Vec<SessionEntry>,
    },
    /// A single session was created on the backend.
    SessionCreated {
        /// The new session's metadata.
        entry: SessionEntry,
    },
    /// Live push of new messages for an ongoing session.
    SessionUpdated {
        /// Target remote session.
        remote_session_id: String,
        /// Newly produced messages.
        messages: Vec<ConversationMessage>,
    },
    /// Backfill push of previously-existing messages.
    SessionHistory {
        /// Target remote session.
        remote_session_id: String,
        /// Replayed messages.
        messages: Vec<ConversationMessage>,
    },
    /// A turn finished on the backend.
    TurnComplete {
        /// Remote session whose turn completed.
        remote_session_id: String,
    },
    /// The backend reports a session as locked.
    SessionLocked {
        /// The locked remote session.
        remote_session_id: String,
        /// Why it is locked.
        reason: String,
    },
    /// Redelivery of a response the client may have missed.
    Replay {
        /// Server-assigned message id.
        message_id: String,
        /// The replayed response.
        message: ReplayMessage,
    },
    /// Server acknowledgment of a client message.
    MessageAck {
        /// The acknowledged message id.
        message_id: String,
    },
    /// Client liveness probe.
    Ping,
    /// Server liveness answer.
    Pong,
}

impl Envelope {
    /// The wire `kind` tag for this envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Connect { .. } => "connect",
            Self::Connected { .. } => "connected",
            Self::AuthError { .. } => "auth_error",
            Self::Prompt { .. } => "prompt",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SessionList { .. } => "session_list",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionUpdated { .. } => "session_updated",
            Self::SessionHistory { .. } => "session_history",
            Self::TurnComplete { .. } => "turn_complete",
            Self::SessionLocked { .. } => "session_locked",
            Self::Replay { .. } => "replay",
            Self::MessageAck { .. } => "message_ack",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// Decode one wire frame into an envelope.
pub fn decode_frame(text: &str) -> Result<Envelope> {
    serde_json::from_str(text).map_err(|e| ProtocolError::malformed(e.to_string(), text))
}

/// Encode an envelope into a wire frame.
pub fn encode_frame(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
