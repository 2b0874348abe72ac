//! The session channel state machine.
//!
//! One [`SessionChannel`] owns one socket to one backend. All inbound
//! frame handling runs on the connection's read task — the single serial
//! delivery context that touches the lock registry, subscription set, and
//! connection flags. Persistence writes go through the sync engine's store
//! contract; prompt submission is fire-and-forget through the outbound
//! pump.
//!
//! Connection epochs guard against stale tasks: every teardown bumps the
//! epoch, and a dial or read loop that outlived its epoch abandons its
//! results instead of installing a ghost socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::ids::{LogicalSessionId, RemoteSessionId};
use tether_core::protocol::{Envelope, decode_frame, encode_frame};
use tether_sync::{Clock, SessionStore, SyncEngine, SystemClock};

use crate::auth::AuthGate;
use crate::config::ChannelConfig;
use crate::errors::ChannelError;
use crate::inflight::InflightCommands;
use crate::lifecycle::{DrainOutcome, LifecycleEvent, run_drain};
use crate::locks::SessionLockRegistry;
use crate::reconnect::ReconnectScheduler;
use crate::router::MessageRouter;
use crate::status::{ChannelStatus, ConnectionState};
use crate::subscriptions::SubscriptionSet;
use crate::transport::{SocketEvent, SocketFactory, TungsteniteFactory};

type JitterSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// The realtime session channel.
///
/// Owns exactly one socket to one backend. Every collaborator is injected:
/// persistence store, clock, socket factory, and the jitter source.
pub struct SessionChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<ChannelConfig>,
    status: Arc<ChannelStatus>,
    auth: AuthGate,
    locks: SessionLockRegistry,
    subscriptions: SubscriptionSet,
    inflight: InflightCommands,
    router: MessageRouter,
    sync: SyncEngine,
    factory: Arc<dyn SocketFactory>,
    jitter: JitterSource,
    /// Failed/closed connections seen since the last successful handshake.
    attempt: AtomicU32,
    /// Bumped on every teardown; stale tasks compare and bail.
    epoch: AtomicU64,
    /// True from dial start until teardown — the `connect` no-op guard.
    socket_active: AtomicBool,
    socket_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    socket_task: Mutex<Option<JoinHandle<()>>>,
    logical: Mutex<Option<LogicalSessionId>>,
    reconnect: ReconnectScheduler,
    drain: Mutex<Option<CancellationToken>>,
}

impl SessionChannel {
    /// Create a channel with the production socket factory, the system
    /// clock, and thread-local randomness for backoff jitter.
    #[must_use]
    pub fn new(config: ChannelConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::with_parts(
            config,
            store,
            Arc::new(TungsteniteFactory),
            Arc::new(SystemClock),
            Arc::new(|| rand::random::<f64>()),
        )
    }

    /// Create a channel with every collaborator injected.
    #[must_use]
    pub fn with_parts(
        config: ChannelConfig,
        store: Arc<dyn SessionStore>,
        factory: Arc<dyn SocketFactory>,
        clock: Arc<dyn Clock>,
        jitter: JitterSource,
    ) -> Self {
        let status = Arc::new(ChannelStatus::new());
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                auth: AuthGate::new(status.clone()),
                status,
                locks: SessionLockRegistry::new(),
                subscriptions: SubscriptionSet::new(),
                inflight: InflightCommands::new(),
                router: MessageRouter::new(),
                sync: SyncEngine::new(store, clock),
                factory,
                jitter,
                attempt: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                socket_active: AtomicBool::new(false),
                socket_tx: Mutex::new(None),
                socket_task: Mutex::new(None),
                logical: Mutex::new(None),
                reconnect: ReconnectScheduler::new(),
                drain: Mutex::new(None),
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observables
    // ─────────────────────────────────────────────────────────────────────

    /// Whether a `hello` has been received on the current socket.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status.is_connected()
    }

    /// Whether the server has acknowledged authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.status.is_authenticated()
    }

    /// Whether reconnection is suppressed pending a new credential.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        self.inner.status.requires_reauthentication()
    }

    /// The most recent error surfaced by the channel.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.status.last_error()
    }

    /// Current coarse connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.status.state()
    }

    /// Whether a reconnect attempt is scheduled.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.reconnect.is_pending()
    }

    /// The per-remote-session turn locks.
    #[must_use]
    pub fn locks(&self) -> &SessionLockRegistry {
        &self.inner.locks
    }

    /// The live-push subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.inner.subscriptions
    }

    /// The in-flight command registry consulted on suspension.
    #[must_use]
    pub fn inflight(&self) -> &InflightCommands {
        &self.inner.inflight
    }

    /// Register (or replace) the per-session message handler.
    pub fn set_message_handler(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.inner.router.set_handler(handler);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Open the socket and begin the handshake.
    ///
    /// A guarded no-op while a socket already exists — near-simultaneous
    /// triggers (view-appear and app-activation firing together) must not
    /// produce duplicate sockets. Callers wanting a fresh connection use
    /// [`Self::force_reconnect`]. Never blocks; the dial runs on a task.
    pub fn connect(&self, logical_session_id: LogicalSessionId) {
        if self.inner.socket_active.load(Ordering::SeqCst) {
            debug!("connect ignored: socket already exists");
            return;
        }
        *self.inner.logical.lock() = Some(logical_session_id);
        self.inner.clone().start_socket();
    }

    /// Tear down the socket and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.inner.teardown();
        info!("disconnected");
    }

    /// Disconnect, reset the backoff counter, and reconnect immediately.
    pub fn force_reconnect(&self) {
        self.inner.teardown();
        self.inner.attempt.store(0, Ordering::SeqCst);
        if self.inner.logical.lock().is_some() {
            info!("forcing reconnect");
            self.inner.clone().start_socket();
        } else {
            debug!("force_reconnect without a session, staying disconnected");
        }
    }

    /// Point the channel at a different backend.
    ///
    /// Disconnects, resets backoff, clears all local session state (two
    /// backends must never mix histories), and reconnects when a logical
    /// session is known.
    pub fn update_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        self.inner.teardown();
        self.inner.config.write().endpoint.clone_from(&endpoint);
        self.inner.attempt.store(0, Ordering::SeqCst);
        info!(%endpoint, "endpoint updated, clearing local session state");

        let inner = self.inner.clone();
        let _ = tokio::spawn(async move {
            if let Err(e) = inner.sync.clear_all().await {
                warn!(error = %e, "failed to clear local state on endpoint change");
            }
        });

        if self.inner.logical.lock().is_some() {
            self.inner.clone().start_socket();
        }
    }

    /// Install a new credential and clear the sticky reauthentication
    /// flag. The external credential-update flow calls this and then
    /// [`Self::force_reconnect`].
    pub fn update_credential(&self, credential: impl Into<String>) {
        self.inner.config.write().credential = credential.into();
        self.inner.status.set_requires_reauthentication(false);
        if self.inner.status.state() == ConnectionState::SuspendedNeedsReauth {
            self.inner.status.set_state(ConnectionState::Disconnected);
        }
        info!("credential updated, reauthentication cleared");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound operations
    // ─────────────────────────────────────────────────────────────────────

    /// Submit a prompt. Fire-and-forget: the call never waits on the
    /// network round trip.
    ///
    /// When targeting an existing remote session the lock is taken
    /// optimistically before the frame leaves, so a duplicate prompt cannot
    /// race in ahead of the server's acknowledgment. A locked session
    /// rejects with [`ChannelError::SessionBusy`].
    pub fn send_prompt(
        &self,
        text: impl Into<String>,
        remote_session_id: Option<&RemoteSessionId>,
        working_directory: impl Into<String>,
    ) -> Result<(), ChannelError> {
        let logical = self
            .inner
            .logical
            .lock()
            .clone()
            .ok_or(ChannelError::NoSession)?;
        if self.inner.socket_tx.lock().is_none() {
            return Err(ChannelError::NotConnected);
        }
        if let Some(remote) = remote_session_id {
            if self.inner.locks.is_locked(remote.as_str()) {
                return Err(ChannelError::SessionBusy {
                    remote_session_id: remote.as_str().to_owned(),
                });
            }
            let _ = self.inner.locks.lock(remote.as_str());
        }
        self.inner.send_envelope(&Envelope::Prompt {
            text: text.into(),
            remote_session_id: remote_session_id.map(|r| r.as_str().to_owned()),
            logical_session_id: logical.into_inner(),
            working_directory: working_directory.into(),
        })
    }

    /// Subscribe to live pushes for a remote session. Idempotent.
    pub fn subscribe(&self, remote_session_id: &RemoteSessionId) {
        let newly_added = self.inner.subscriptions.insert(remote_session_id.as_str());
        if newly_added && self.inner.status.is_connected() {
            let _ = self.inner.send_envelope(&Envelope::Subscribe {
                remote_session_id: remote_session_id.normalized(),
            });
        }
    }

    /// Unsubscribe from live pushes for a remote session. Idempotent.
    pub fn unsubscribe(&self, remote_session_id: &RemoteSessionId) {
        let was_present = self.inner.subscriptions.remove(remote_session_id.as_str());
        if was_present && self.inner.status.is_connected() {
            let _ = self.inner.send_envelope(&Envelope::Unsubscribe {
                remote_session_id: remote_session_id.normalized(),
            });
        }
    }

    /// Register a host command that should hold the socket open across a
    /// suspension.
    pub fn register_command(&self, command_id: &str, label: impl Into<String>) {
        self.inner.inflight.register(command_id, label);
    }

    /// Mark a registered host command as complete.
    pub fn complete_command(&self, command_id: &str) {
        self.inner.inflight.complete(command_id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // App lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Feed a host app-lifecycle transition into the channel.
    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Foregrounded { reachable } => self.on_foregrounded(reachable),
            LifecycleEvent::WillSuspend { grace } => self.on_will_suspend(grace),
        }
    }

    fn on_foregrounded(&self, reachable: bool) {
        if let Some(drain) = self.inner.drain.lock().take() {
            drain.cancel();
        }
        if !reachable {
            debug!("foregrounded without reachability, staying down");
            return;
        }
        if self.inner.status.requires_reauthentication() {
            debug!("foregrounded but reauthentication required, staying down");
            return;
        }
        if self.inner.socket_active.load(Ordering::SeqCst) {
            return;
        }
        if self.inner.logical.lock().is_some() {
            info!("foreground resumption, reconnecting");
            self.inner.clone().start_socket();
        }
    }

    fn on_will_suspend(&self, grace: Duration) {
        if self.inner.locks.is_empty() && self.inner.inflight.is_empty() {
            info!("suspending with no work in flight, disconnecting");
            self.inner.teardown();
            return;
        }

        info!(
            locks = self.inner.locks.len(),
            inflight = self.inner.inflight.len(),
            grace_secs = grace.as_secs(),
            "suspension deferred, draining in-flight work"
        );
        let cancel = CancellationToken::new();
        if let Some(previous) = self.inner.drain.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        let poll = Duration::from_millis(self.inner.config.read().drain_poll_ms);
        let inner = self.inner.clone();
        let _ = tokio::spawn(async move {
            let probe = inner.clone();
            let outcome = run_drain(
                move || probe.locks.is_empty() && probe.inflight.is_empty(),
                poll,
                grace,
                cancel,
            )
            .await;
            match outcome {
                DrainOutcome::Cancelled => debug!("suspension drain cancelled"),
                DrainOutcome::Drained | DrainOutcome::GraceExpired => {
                    info!(?outcome, "suspension drain finished, disconnecting");
                    inner.teardown();
                }
            }
        });
    }
}

impl Inner {
    /// Begin a connection attempt unless a socket already exists.
    fn start_socket(self: Arc<Self>) {
        if self.socket_active.swap(true, Ordering::SeqCst) {
            debug!("socket already active, not dialing");
            return;
        }
        self.status.set_state(ConnectionState::Connecting);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self);
        let task = tokio::spawn(async move {
            inner.run_connection(epoch).await;
        });
        *self.socket_task.lock() = Some(task);
    }

    /// Dial, install the socket, and run the read loop to completion.
    async fn run_connection(self: Arc<Self>, epoch: u64) {
        let url = self.config.read().endpoint.clone();
        info!(%url, "connecting");
        match self.factory.connect(&url).await {
            Err(e) => {
                if !self.is_current(epoch) {
                    return;
                }
                warn!(error = %e, "socket connect failed");
                self.status.set_last_error(e.to_string());
                Arc::clone(&self).connection_lost();
            }
            Ok(handle) => {
                if !self.is_current(epoch) {
                    // A deliberate teardown raced the dial; abandon it.
                    return;
                }
                *self.socket_tx.lock() = Some(handle.outbound);
                self.status.set_state(ConnectionState::AwaitingHello);
                debug!("socket open, awaiting hello");

                let reason = self.read_loop(handle.inbound).await;
                if !self.is_current(epoch) {
                    return;
                }
                if let Some(reason) = reason {
                    self.status.set_last_error(reason);
                }
                Arc::clone(&self).connection_lost();
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// The serial delivery loop: frames in, heartbeat pings out.
    async fn read_loop(&self, mut inbound: mpsc::UnboundedReceiver<SocketEvent>) -> Option<String> {
        let (ping_every, timeout) = {
            let config = self.config.read();
            (
                Duration::from_secs(config.heartbeat_interval_secs.max(1)),
                Duration::from_secs(config.heartbeat_timeout_secs.max(1)),
            )
        };
        let mut ping = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping.tick().await;
        let mut last_traffic = tokio::time::Instant::now();

        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(SocketEvent::Frame(text)) => {
                        last_traffic = tokio::time::Instant::now();
                        self.handle_frame(&text).await;
                    }
                    Some(SocketEvent::Closed(reason)) => {
                        info!(reason = reason.as_deref().unwrap_or("-"), "socket closed");
                        return reason;
                    }
                    None => {
                        info!("socket stream ended");
                        return None;
                    }
                },
                _ = ping.tick() => {
                    if last_traffic.elapsed() >= timeout {
                        warn!(timeout_secs = timeout.as_secs(), "no traffic within heartbeat timeout, dropping socket");
                        return Some("heartbeat timeout".to_owned());
                    }
                    if self.send_envelope(&Envelope::Ping).is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Decode and dispatch one frame. Malformed frames are dropped with a
    /// logged warning and no state mutation.
    async fn handle_frame(&self, text: &str) {
        match decode_frame(text) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    async fn dispatch(&self, envelope: Envelope) {
        match envelope {
            Envelope::Hello {
                protocol_version,
                auth_version,
            } => {
                self.auth.on_hello(protocol_version, auth_version);
                let logical = self.logical.lock().clone();
                match logical {
                    Some(logical) => {
                        let credential = self.config.read().credential.clone();
                        if let Err(e) = self.send_envelope(&Envelope::Connect {
                            logical_session_id: logical.into_inner(),
                            credential,
                        }) {
                            warn!(error = %e, "failed to send connect request");
                        }
                    }
                    None => warn!("hello received without a logical session"),
                }
            }
            Envelope::Connected { logical_session_id } => {
                self.auth.on_connected();
                self.attempt.store(0, Ordering::SeqCst);
                debug!(logical_session_id, "handshake complete");
                // Subscriptions survive reconnects; replay them.
                for remote_session_id in self.subscriptions.snapshot() {
                    let _ = self.send_envelope(&Envelope::Subscribe { remote_session_id });
                }
            }
            Envelope::AuthError { reason } => self.auth.on_auth_failed(&reason),
            Envelope::TurnComplete { remote_session_id } => {
                let _ = self.locks.unlock(&remote_session_id);
            }
            Envelope::Error {
                reason,
                remote_session_id,
            } => {
                warn!(
                    reason,
                    remote_session_id = remote_session_id.as_deref().unwrap_or("-"),
                    "operation error"
                );
                if let Some(id) = remote_session_id {
                    let _ = self.locks.unlock(&id);
                }
                self.status.set_last_error(reason);
            }
            Envelope::SessionLocked {
                remote_session_id,
                reason,
            } => {
                debug!(remote_session_id, reason, "server reports session locked");
                let _ = self.locks.lock(&remote_session_id);
            }
            Envelope::Response {
                text,
                remote_session_id,
                logical_session_id,
            } => {
                debug!(remote_session_id, "response received");
                self.router.deliver(&text, &logical_session_id);
            }
            Envelope::Replay {
                message_id,
                message,
            } => {
                debug!(message_id, "delivering replayed message");
                self.router.deliver(&message.text, &message.logical_session_id);
            }
            Envelope::MessageAck { message_id } => debug!(message_id, "message acknowledged"),
            Envelope::SessionList { entries } => {
                if let Err(e) = self.sync.apply_session_list(&entries).await {
                    warn!(error = %e, "session list sync failed");
                }
            }
            Envelope::SessionCreated { entry } => {
                if let Err(e) = self.sync.apply_session_created(&entry).await {
                    warn!(error = %e, "session creation sync failed");
                }
            }
            Envelope::SessionUpdated {
                remote_session_id,
                messages,
            } => {
                if let Err(e) = self
                    .sync
                    .apply_live_update(&remote_session_id, &messages)
                    .await
                {
                    warn!(error = %e, remote_session_id, "live update failed");
                }
            }
            Envelope::SessionHistory {
                remote_session_id,
                messages,
            } => {
                if let Err(e) = self.sync.apply_history(&remote_session_id, &messages).await {
                    warn!(error = %e, remote_session_id, "history replay failed");
                }
            }
            Envelope::Pong => debug!("pong"),
            Envelope::Ping
            | Envelope::Connect { .. }
            | Envelope::Prompt { .. }
            | Envelope::Subscribe { .. }
            | Envelope::Unsubscribe { .. } => {
                debug!(kind = envelope.kind(), "ignoring unexpected client-bound envelope");
            }
        }
    }

    /// Encode and enqueue one outbound frame.
    fn send_envelope(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let frame = encode_frame(envelope)?;
        let tx = self
            .socket_tx
            .lock()
            .clone()
            .ok_or(ChannelError::NotConnected)?;
        tx.send(frame).map_err(|_| ChannelError::NotConnected)
    }

    /// The socket failed or closed underneath us: reset flags, drop every
    /// lock, and schedule a backoff reconnect unless reauth is required.
    fn connection_lost(self: Arc<Self>) {
        let _ = self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.socket_tx.lock() = None;
        self.socket_active.store(false, Ordering::SeqCst);
        self.status.set_connected(false);
        self.status.set_authenticated(false);
        // In-flight locks cannot be trusted against a dead connection.
        self.locks.clear();

        if self.status.requires_reauthentication() {
            self.status.set_state(ConnectionState::SuspendedNeedsReauth);
            info!("reauthentication required, suppressing reconnect");
        } else {
            self.status.set_state(ConnectionState::Disconnected);
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: Arc<Self>) {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        let delay_ms = {
            let config = self.config.read();
            config.reconnect.delay_ms(attempt, (self.jitter)())
        };
        info!(attempt, delay_ms, "scheduling reconnect");
        let inner = Arc::clone(&self);
        self.reconnect
            .schedule(Duration::from_millis(delay_ms), async move {
                inner.start_socket();
            });
    }

    /// Deliberate shutdown: cancel timers first so a reconnect cannot race
    /// the teardown, then drop the socket and reset flags.
    fn teardown(&self) {
        self.reconnect.cancel();
        if let Some(drain) = self.drain.lock().take() {
            drain.cancel();
        }
        let _ = self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.socket_task.lock().take() {
            task.abort();
        }
        *self.socket_tx.lock() = None;
        self.socket_active.store(false, Ordering::SeqCst);
        self.status.set_connected(false);
        self.status.set_authenticated(false);
        self.locks.clear();
        self.status.set_state(if self.status.requires_reauthentication() {
            ConnectionState::SuspendedNeedsReauth
        } else {
            ConnectionState::Disconnected
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
