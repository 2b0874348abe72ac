//! # tether-core
//!
//! Foundation types for the Tether realtime session channel.
//!
//! This crate provides the shared vocabulary the channel and sync crates
//! depend on:
//!
//! - **Branded IDs**: [`LogicalSessionId`] and [`RemoteSessionId`] newtypes
//! - **Wire protocol**: [`Envelope`] — the `kind`-tagged frame vocabulary,
//!   with [`decode_frame`] / [`encode_frame`]
//! - **Content blocks**: [`ContentBlock`] and [`ConversationMessage`] as
//!   pushed inside `session_updated` / `session_history` frames
//! - **Backoff math**: [`ReconnectPolicy`] and the jittered delay functions
//! - **Errors**: [`ProtocolError`]

#![deny(unsafe_code)]

pub mod backoff;
pub mod content;
pub mod errors;
pub mod ids;
pub mod protocol;

pub use backoff::{ReconnectPolicy, backoff_delay_ms_with_random};
pub use content::{ContentBlock, ConversationMessage, MessageBody};
pub use errors::ProtocolError;
pub use ids::{LogicalSessionId, RemoteSessionId};
pub use protocol::{Envelope, ReplayMessage, SessionEntry, decode_frame, encode_frame};
