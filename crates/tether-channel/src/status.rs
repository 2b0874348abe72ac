//! Observable channel state.
//!
//! The flags are atomics because callers poll them from UI contexts while
//! the delivery task mutates them; the coarse state and last error sit
//! behind mutexes since they are read rarely.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no pending attempt.
    Disconnected,
    /// A socket is being established.
    Connecting,
    /// Socket open, waiting for the server `hello`.
    AwaitingHello,
    /// `hello` received, `connect` sent, waiting for `connected`.
    Authenticating,
    /// Fully authenticated.
    Connected,
    /// Authentication was rejected; reconnection is suppressed until the
    /// credential is replaced.
    SuspendedNeedsReauth,
}

/// Shared observable status of a channel.
pub struct ChannelStatus {
    state: Mutex<ConnectionState>,
    is_connected: AtomicBool,
    is_authenticated: AtomicBool,
    requires_reauthentication: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl ChannelStatus {
    /// Create a disconnected status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            is_connected: AtomicBool::new(false),
            is_authenticated: AtomicBool::new(false),
            requires_reauthentication: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Current coarse state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to a new coarse state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Whether a `hello` has been received on the current socket.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    /// Set the connected flag.
    pub fn set_connected(&self, connected: bool) {
        self.is_connected.store(connected, Ordering::Relaxed);
    }

    /// Whether the server has acknowledged authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated.load(Ordering::Relaxed)
    }

    /// Set the authenticated flag.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.is_authenticated.store(authenticated, Ordering::Relaxed);
    }

    /// Whether reconnection is suppressed pending a new credential.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        self.requires_reauthentication.load(Ordering::Relaxed)
    }

    /// Set the sticky reauthentication flag.
    pub fn set_requires_reauthentication(&self, required: bool) {
        self.requires_reauthentication
            .store(required, Ordering::Relaxed);
    }

    /// The most recent error surfaced by the channel.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Record an error.
    pub fn set_last_error(&self, error: impl Into<String>) {
        *self.last_error.lock() = Some(error.into());
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::new()
    }
}
