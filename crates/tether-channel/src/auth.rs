//! Authentication gate.
//!
//! Consumes handshake envelopes and maintains the authenticated /
//! reauth-required flags on the shared [`ChannelStatus`]. The
//! reauth-required flag is sticky: retrying with the same bad credential
//! would fail identically, so the channel suppresses reconnection until an
//! external credential-update flow replaces the credential and forces a
//! reconnect.

use std::sync::Arc;

use tracing::{info, warn};

use crate::status::{ChannelStatus, ConnectionState};

/// Highest auth scheme version this client understands.
pub const SUPPORTED_AUTH_VERSION: u32 = 1;

/// Tracks authentication state over the channel status.
pub struct AuthGate {
    status: Arc<ChannelStatus>,
}

impl AuthGate {
    /// Create a gate over the given status.
    #[must_use]
    pub fn new(status: Arc<ChannelStatus>) -> Self {
        Self { status }
    }

    /// Consume a `hello`. A newer server auth version is non-fatal.
    pub fn on_hello(&self, protocol_version: u32, auth_version: u32) {
        if auth_version > SUPPORTED_AUTH_VERSION {
            warn!(
                server_auth_version = auth_version,
                supported = SUPPORTED_AUTH_VERSION,
                "server auth version newer than client, proceeding"
            );
        }
        info!(protocol_version, auth_version, "handshake hello received");
        self.status.set_connected(true);
        self.status.set_state(ConnectionState::Authenticating);
    }

    /// Consume a `connected` acknowledgment.
    pub fn on_connected(&self) {
        self.status.set_authenticated(true);
        self.status.set_state(ConnectionState::Connected);
        info!("authenticated");
    }

    /// Consume an `auth_error`. Sets the sticky reauth flag.
    pub fn on_auth_failed(&self, reason: &str) {
        warn!(reason, "authentication rejected");
        self.status.set_authenticated(false);
        self.status.set_requires_reauthentication(true);
        self.status.set_last_error(reason);
        self.status.set_state(ConnectionState::SuspendedNeedsReauth);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
