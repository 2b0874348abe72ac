//! App-lifecycle events and the suspension drain loop.
//!
//! Lifecycle transitions arrive as discrete events fed into the channel
//! rather than ambient host notifications. On impending suspension the
//! channel holds the socket open while turns or registered commands are in
//! flight, polling until they drain or a host-provided grace window
//! elapses.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Host app-lifecycle transitions relevant to the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The app returned to the foreground.
    Foregrounded {
        /// Whether the network is currently reachable.
        reachable: bool,
    },
    /// The host is about to suspend the app.
    WillSuspend {
        /// How long the host allows before the socket must go down.
        grace: Duration,
    },
}

/// Why the drain loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Locks and in-flight commands emptied within the window.
    Drained,
    /// The grace window elapsed with work still in flight.
    GraceExpired,
    /// A foreground event (or shutdown) cancelled the drain.
    Cancelled,
}

/// Poll `is_drained` every `poll` until it reports empty, `grace` elapses,
/// or `cancel` fires.
pub async fn run_drain(
    is_drained: impl Fn() -> bool + Send,
    poll: Duration,
    grace: Duration,
    cancel: CancellationToken,
) -> DrainOutcome {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        if is_drained() {
            debug!("suspension drain complete");
            return DrainOutcome::Drained;
        }
        if tokio::time::Instant::now() >= deadline {
            debug!("suspension grace window elapsed with work in flight");
            return DrainOutcome::GraceExpired;
        }
        tokio::select! {
            () = cancel.cancelled() => return DrainOutcome::Cancelled,
            () = tokio::time::sleep(poll) => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
