//! Error types for the channel crate.

use thiserror::Error;

use crate::transport::TransportError;
use tether_core::errors::ProtocolError;

/// Errors surfaced by [`crate::SessionChannel`] operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No usable socket.
    #[error("not connected to the backend")]
    NotConnected,

    /// `connect` has not been called with a logical session id yet.
    #[error("no logical session; call connect first")]
    NoSession,

    /// The target remote session already has a turn in flight.
    #[error("session {remote_session_id} has a turn in flight")]
    SessionBusy {
        /// The locked remote session.
        remote_session_id: String,
    },

    /// Frame encode/decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket establishment failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
