//! End-to-end channel scenarios against a scripted in-process socket.
//!
//! The scripted factory plays the backend: tests feed it server frames and
//! observe client frames, store writes, and channel flags. Paused-time
//! tests drive the heartbeat, backoff, and drain timers deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tether_channel::transport::{SocketEvent, SocketFactory, SocketHandle, TransportError};
use tether_channel::{ChannelConfig, ChannelError, ConnectionState, LifecycleEvent, SessionChannel};
use tether_core::content::{ContentBlock, ConversationMessage};
use tether_core::ids::{LogicalSessionId, RemoteSessionId};
use tether_core::protocol::{Envelope, ReplayMessage, SessionEntry, encode_frame};
use tether_sync::{Clock, FixedClock, MemorySessionStore};

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct ServerSide {
    to_client: mpsc::UnboundedSender<SocketEvent>,
    from_client: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ServerSide {
    fn send(&self, envelope: &Envelope) {
        let frame = encode_frame(envelope).unwrap();
        self.to_client.send(SocketEvent::Frame(frame)).unwrap();
    }

    fn send_raw(&self, frame: &str) {
        self.to_client
            .send(SocketEvent::Frame(frame.to_owned()))
            .unwrap();
    }

    fn close(&self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(SocketEvent::Closed(reason.map(Into::into)));
    }

    /// Drain every frame the client has sent so far, parsed as JSON.
    fn drain_frames(&self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        let mut rx = self.from_client.lock();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }
}

struct ScriptedFactory {
    dials: AtomicUsize,
    urls: Mutex<Vec<String>>,
    ends: Mutex<Vec<Arc<ServerSide>>>,
}

impl ScriptedFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            dials: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            ends: Mutex::new(Vec::new()),
        })
    }

    fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    fn end(&self, index: usize) -> Arc<ServerSide> {
        self.ends.lock()[index].clone()
    }

    fn latest_end(&self) -> Arc<ServerSide> {
        self.ends.lock().last().expect("no socket dialed").clone()
    }
}

#[async_trait]
impl SocketFactory for ScriptedFactory {
    async fn connect(&self, url: &str) -> Result<SocketHandle, TransportError> {
        let _ = self.dials.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_owned());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.ends.lock().push(Arc::new(ServerSide {
            to_client: in_tx,
            from_client: Mutex::new(out_rx),
        }));
        Ok(SocketHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

struct Backend {
    factory: Arc<ScriptedFactory>,
    channel: SessionChannel,
    store: Arc<MemorySessionStore>,
    clock: Arc<FixedClock>,
}

fn backend() -> Backend {
    let factory = ScriptedFactory::new();
    let clock = Arc::new(FixedClock::new("2026-03-01T00:00:00Z".parse().unwrap()));
    let store = Arc::new(MemorySessionStore::with_clock(clock.clone()));
    let config = ChannelConfig {
        credential: "test-credential".into(),
        ..ChannelConfig::default()
    };
    let channel = SessionChannel::with_parts(
        config,
        store.clone(),
        factory.clone(),
        clock.clone(),
        Arc::new(|| 0.5), // deterministic jitter: delay == base
    );
    Backend {
        factory,
        channel,
        store,
        clock,
    }
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Connect and complete the hello → connect → connected handshake.
async fn handshake(backend: &Backend, logical: &str) -> Arc<ServerSide> {
    backend.channel.connect(LogicalSessionId::from(logical));
    settle().await;
    let server = backend.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::Connected {
        logical_session_id: logical.to_owned(),
    });
    settle().await;
    server
}

fn remote(id: &str) -> RemoteSessionId {
    RemoteSessionId::from(id)
}

fn assistant_text(text: &str) -> ConversationMessage {
    ConversationMessage::with_blocks("assistant", vec![ContentBlock::text(text)])
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake and auth
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn handshake_reaches_authenticated() {
    let b = backend();
    b.channel.connect(LogicalSessionId::from("ui-1"));
    settle().await;
    assert_eq!(b.channel.state(), ConnectionState::AwaitingHello);
    assert!(!b.channel.is_connected());

    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    assert!(b.channel.is_connected());
    assert!(!b.channel.is_authenticated());
    assert_eq!(b.channel.state(), ConnectionState::Authenticating);

    // The client auto-sent its connect request with the credential.
    let frames = server.drain_frames();
    let connect = frames
        .iter()
        .find(|f| f["kind"] == "connect")
        .expect("connect frame");
    assert_eq!(connect["logicalSessionId"], "ui-1");
    assert_eq!(connect["credential"], "test-credential");

    server.send(&Envelope::Connected {
        logical_session_id: "ui-1".into(),
    });
    settle().await;
    assert!(b.channel.is_authenticated());
    assert_eq!(b.channel.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_is_sticky_and_suppresses_reconnection() {
    let b = backend();
    b.channel.connect(LogicalSessionId::from("ui-1"));
    settle().await;
    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::AuthError {
        reason: "bad key".into(),
    });
    settle().await;

    assert!(!b.channel.is_authenticated());
    assert!(b.channel.requires_reauthentication());
    assert_eq!(b.channel.last_error().as_deref(), Some("bad key"));
    assert!(!b.channel.reconnect_pending());

    // The server drops the socket; still no reconnect may be scheduled.
    server.close(Some("auth rejected"));
    settle().await;
    assert!(!b.channel.reconnect_pending());
    assert_eq!(b.channel.state(), ConnectionState::SuspendedNeedsReauth);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(b.factory.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn credential_update_then_force_reconnect_recovers() {
    let b = backend();
    b.channel.connect(LogicalSessionId::from("ui-1"));
    settle().await;
    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::AuthError {
        reason: "bad key".into(),
    });
    server.close(None);
    settle().await;
    assert!(b.channel.requires_reauthentication());

    b.channel.update_credential("rotated-credential");
    assert!(!b.channel.requires_reauthentication());
    b.channel.force_reconnect();
    settle().await;
    assert_eq!(b.factory.dial_count(), 2);

    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    let frames = server.drain_frames();
    let connect = frames.iter().find(|f| f["kind"] == "connect").unwrap();
    assert_eq!(connect["credential"], "rotated-credential");
}

#[tokio::test(start_paused = true)]
async fn newer_server_auth_version_is_non_fatal() {
    let b = backend();
    b.channel.connect(LogicalSessionId::from("ui-1"));
    settle().await;
    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 99,
    });
    settle().await;
    assert!(b.channel.is_connected());
    assert!(!b.channel.requires_reauthentication());
}

// ─────────────────────────────────────────────────────────────────────────────
// Locks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn prompt_locks_until_turn_complete() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;

    b.channel
        .send_prompt("do the thing", Some(&remote("s1")), "/srv/app")
        .unwrap();
    assert!(b.channel.locks().is_locked("s1"));

    // Intermediate traffic must not release the lock.
    server.send(&Envelope::SessionUpdated {
        remote_session_id: "s1".into(),
        messages: vec![assistant_text("working on it")],
    });
    server.send(&Envelope::Response {
        text: "tool output incoming".into(),
        remote_session_id: "s1".into(),
        logical_session_id: "ui-1".into(),
    });
    settle().await;
    assert!(b.channel.locks().is_locked("s1"));

    // A second prompt to the same session is rejected.
    let result = b
        .channel
        .send_prompt("again?", Some(&remote("s1")), "/srv/app");
    assert!(matches!(result, Err(ChannelError::SessionBusy { .. })));

    server.send(&Envelope::TurnComplete {
        remote_session_id: "s1".into(),
    });
    settle().await;
    assert!(!b.channel.locks().is_locked("s1"));

    b.channel
        .send_prompt("next turn", Some(&remote("s1")), "/srv/app")
        .unwrap();
    assert!(b.channel.locks().is_locked("s1"));
}

#[tokio::test(start_paused = true)]
async fn error_with_session_id_unlocks() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("x", Some(&remote("s1")), "/srv")
        .unwrap();
    server.send(&Envelope::Error {
        reason: "turn failed".into(),
        remote_session_id: Some("s1".into()),
    });
    settle().await;
    assert!(!b.channel.locks().is_locked("s1"));
    assert_eq!(b.channel.last_error().as_deref(), Some("turn failed"));
}

#[tokio::test(start_paused = true)]
async fn error_without_session_id_keeps_locks() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("x", Some(&remote("s1")), "/srv")
        .unwrap();
    server.send(&Envelope::Error {
        reason: "unrelated failure".into(),
        remote_session_id: None,
    });
    settle().await;
    assert!(b.channel.locks().is_locked("s1"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_turn_complete_is_harmless() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("x", Some(&remote("s1")), "/srv")
        .unwrap();
    server.send(&Envelope::TurnComplete {
        remote_session_id: "s1".into(),
    });
    server.send(&Envelope::TurnComplete {
        remote_session_id: "s1".into(),
    });
    server.send(&Envelope::TurnComplete {
        remote_session_id: "never-locked".into(),
    });
    settle().await;
    assert!(b.channel.locks().is_empty());
    assert!(b.channel.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn case_mismatched_turn_complete_leaves_lock_stuck() {
    // Documented sharp edge: lock matching is exact.
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("x", Some(&remote("S1")), "/srv")
        .unwrap();
    server.send(&Envelope::TurnComplete {
        remote_session_id: "s1".into(),
    });
    settle().await;
    assert!(b.channel.locks().is_locked("S1"));
}

#[tokio::test(start_paused = true)]
async fn independent_sessions_lock_independently() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("a", Some(&remote("s1")), "/srv")
        .unwrap();
    b.channel
        .send_prompt("b", Some(&remote("s2")), "/srv")
        .unwrap();
    server.send(&Envelope::TurnComplete {
        remote_session_id: "s2".into(),
    });
    settle().await;
    assert!(b.channel.locks().is_locked("s1"));
    assert!(!b.channel.locks().is_locked("s2"));
}

#[tokio::test(start_paused = true)]
async fn server_session_locked_gates_prompts() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    server.send(&Envelope::SessionLocked {
        remote_session_id: "s1".into(),
        reason: "turn in flight on another device".into(),
    });
    settle().await;
    let result = b.channel.send_prompt("mine now", Some(&remote("s1")), "/srv");
    assert!(matches!(result, Err(ChannelError::SessionBusy { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn interleaved_responses_route_without_cross_delivery() {
    let b = backend();
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    b.channel.set_message_handler(move |text, logical| {
        sink.lock().push((text.to_owned(), logical.to_owned()));
    });
    let server = handshake(&b, "ui-1").await;

    server.send(&Envelope::Response {
        text: "for A".into(),
        remote_session_id: "r1".into(),
        logical_session_id: "a".into(),
    });
    server.send(&Envelope::Response {
        text: "for B".into(),
        remote_session_id: "r2".into(),
        logical_session_id: "b".into(),
    });
    settle().await;

    let deliveries = seen.lock();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.contains(&("for A".into(), "a".into())));
    assert!(deliveries.contains(&("for B".into(), "b".into())));
}

#[tokio::test(start_paused = true)]
async fn replay_delivers_like_a_response() {
    let b = backend();
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    b.channel.set_message_handler(move |text, logical| {
        sink.lock().push((text.to_owned(), logical.to_owned()));
    });
    let server = handshake(&b, "ui-1").await;

    server.send(&Envelope::Replay {
        message_id: "m-17".into(),
        message: ReplayMessage {
            text: "you missed this".into(),
            remote_session_id: "r1".into(),
            logical_session_id: "ui-1".into(),
        },
    });
    settle().await;
    assert_eq!(
        seen.lock().as_slice(),
        &[("you missed this".into(), "ui-1".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_logical_id_routes_unmodified() {
    let b = backend();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    b.channel
        .set_message_handler(move |_text, logical| sink.lock().push(logical.to_owned()));
    let server = handshake(&b, "ui-1").await;

    server.send(&Envelope::Response {
        text: "orphan".into(),
        remote_session_id: "r1".into(),
        logical_session_id: String::new(),
    });
    settle().await;
    assert_eq!(seen.lock().as_slice(), &[String::new()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconnection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn socket_loss_clears_locks_and_schedules_backoff() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("a", Some(&remote("s1")), "/srv")
        .unwrap();
    b.channel
        .send_prompt("b", Some(&remote("s2")), "/srv")
        .unwrap();
    assert_eq!(b.channel.locks().len(), 2);

    server.close(Some("network blip"));
    settle().await;
    assert!(b.channel.locks().is_empty());
    assert!(!b.channel.is_connected());
    assert!(!b.channel.is_authenticated());
    assert!(b.channel.reconnect_pending());

    // jitter 0.5 → attempt 0 delay is exactly 1 s
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_until_handshake_resets_it() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;

    // First loss: reconnect after ~1 s.
    b.factory.end(0).close(None);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 2);

    // Second loss without a successful handshake: ~2 s.
    b.factory.end(1).close(None);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 2, "second retry must not fire early");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 3);

    // Complete the handshake — the attempt counter resets.
    let server = b.factory.end(2);
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::Connected {
        logical_session_id: "ui-1".into(),
    });
    settle().await;

    // Next loss is back to the ~1 s delay.
    server.close(None);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    server.close(None);
    settle().await;
    assert!(b.channel.reconnect_pending());

    b.channel.disconnect();
    assert!(!b.channel.reconnect_pending());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(b.factory.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_survive_reconnect() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel.subscribe(&remote("Sess-A"));
    settle().await;
    let frames = server.drain_frames();
    assert!(
        frames
            .iter()
            .any(|f| f["kind"] == "subscribe" && f["remoteSessionId"] == "sess-a")
    );

    server.close(None);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(b.factory.dial_count(), 2);

    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::Connected {
        logical_session_id: "ui-1".into(),
    });
    settle().await;

    let frames = server.drain_frames();
    assert!(
        frames
            .iter()
            .any(|f| f["kind"] == "subscribe" && f["remoteSessionId"] == "sess-a"),
        "subscription must be replayed after the new handshake"
    );
}

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout_drops_a_silent_socket() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    let _ = server.drain_frames();

    // 90 s of silence (pings at 30/60/90; the 90 s tick trips the timeout),
    // then the ~1 s backoff.
    tokio::time::sleep(Duration::from_secs(95)).await;
    settle().await;

    assert_eq!(b.factory.dial_count(), 2);
    let frames = server.drain_frames();
    assert!(
        frames.iter().any(|f| f["kind"] == "ping"),
        "client must have sent heartbeat pings"
    );
    assert_eq!(
        b.channel.last_error().as_deref(),
        Some("heartbeat timeout")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync data plane
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn live_update_persists_rendered_messages() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;

    server.send(&Envelope::SessionUpdated {
        remote_session_id: "Sess-1".into(),
        messages: vec![
            ConversationMessage::with_text("system", "noise"),
            assistant_text("the answer"),
        ],
    });
    settle().await;

    // Normalized id, placeholder metadata, filtered append.
    let record = b.store.session("sess-1").expect("record created");
    assert_eq!(record.message_count, 1);
    assert_eq!(record.preview.as_deref(), Some("the answer"));
    assert!(record.name.is_empty());
    assert_eq!(b.store.messages("sess-1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_preserves_recency_while_update_advances_it() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    let t0 = "2026-02-01T00:00:00Z".parse().unwrap();

    server.send(&Envelope::SessionCreated {
        entry: SessionEntry {
            id: Some("sess-1".into()),
            name: Some("older work".into()),
            last_modified: Some(t0),
            ..SessionEntry::default()
        },
    });
    settle().await;
    assert_eq!(b.store.session("sess-1").unwrap().last_modified, t0);

    // Backfill: recency must not move.
    b.clock.advance(chrono::Duration::minutes(10));
    server.send(&Envelope::SessionHistory {
        remote_session_id: "sess-1".into(),
        messages: vec![assistant_text("from the archive")],
    });
    settle().await;
    let record = b.store.session("sess-1").unwrap();
    assert_eq!(record.last_modified, t0);
    assert_eq!(record.message_count, 1);

    // Live update: recency advances to now.
    server.send(&Envelope::SessionUpdated {
        remote_session_id: "sess-1".into(),
        messages: vec![assistant_text("fresh")],
    });
    settle().await;
    let record = b.store.session("sess-1").unwrap();
    assert!(record.last_modified > t0);
    assert_eq!(record.message_count, 2);
}

#[tokio::test(start_paused = true)]
async fn session_list_confirms_local_records() {
    let b = backend();
    let mut local = tether_sync::SessionRecord::placeholder("sess-1", b.clock.now());
    local.locally_originated = true;
    local.name = "draft".into();
    {
        use tether_sync::SessionStore;
        b.store.upsert_session(local).await.unwrap();
    }

    let server = handshake(&b, "ui-1").await;
    server.send(&Envelope::SessionList {
        entries: vec![SessionEntry {
            id: Some("sess-1".into()),
            name: Some("confirmed".into()),
            working_directory: Some("/srv/app".into()),
            ..SessionEntry::default()
        }],
    });
    settle().await;

    let record = b.store.session("sess-1").unwrap();
    assert!(!record.locally_originated);
    assert_eq!(record.name, "confirmed");
    assert_eq!(record.working_directory, "/srv/app");
}

#[tokio::test(start_paused = true)]
async fn session_created_without_id_is_ignored() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    server.send(&Envelope::SessionCreated {
        entry: SessionEntry {
            name: Some("nameless".into()),
            ..SessionEntry::default()
        },
    });
    settle().await;
    assert_eq!(b.store.session_count(), 0);
    assert!(b.channel.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn update_endpoint_clears_local_state_and_redials() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    server.send(&Envelope::SessionUpdated {
        remote_session_id: "sess-1".into(),
        messages: vec![assistant_text("on backend A")],
    });
    settle().await;
    assert_eq!(b.store.session_count(), 1);

    b.channel.update_endpoint("ws://backend-b.example.com:8080");
    settle().await;

    assert_eq!(b.store.session_count(), 0, "endpoint change must not mix histories");
    assert_eq!(b.factory.dial_count(), 2);
    assert_eq!(
        b.factory.urls.lock().last().unwrap(),
        "ws://backend-b.example.com:8080"
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_state_change() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("x", Some(&remote("s1")), "/srv")
        .unwrap();

    server.send_raw("{not json");
    server.send_raw(r#"{"kind":"telepathy","remoteSessionId":"s1"}"#);
    server.send_raw(r#"{"kind":"turn_complete"}"#);
    settle().await;

    assert!(b.channel.is_authenticated());
    assert!(b.channel.locks().is_locked("s1"));
    assert_eq!(b.store.session_count(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// App lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn suspension_with_no_work_disconnects_immediately() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;
    b.channel.handle_lifecycle(LifecycleEvent::WillSuspend {
        grace: Duration::from_secs(10),
    });
    settle().await;
    assert!(!b.channel.is_connected());
    assert_eq!(b.channel.state(), ConnectionState::Disconnected);
    assert!(!b.channel.reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn suspension_defers_until_turn_completes() {
    let b = backend();
    let server = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("long job", Some(&remote("s1")), "/srv")
        .unwrap();

    b.channel.handle_lifecycle(LifecycleEvent::WillSuspend {
        grace: Duration::from_secs(30),
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(b.channel.is_connected(), "drain must hold the socket open");

    server.send(&Envelope::TurnComplete {
        remote_session_id: "s1".into(),
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert!(!b.channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn suspension_defers_until_inflight_commands_complete() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;
    b.channel.register_command("upload-1", "photo upload");

    b.channel.handle_lifecycle(LifecycleEvent::WillSuspend {
        grace: Duration::from_secs(30),
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(b.channel.is_connected());

    b.channel.complete_command("upload-1");
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert!(!b.channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn suspension_grace_expiry_forces_disconnect() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("stuck job", Some(&remote("s1")), "/srv")
        .unwrap();

    b.channel.handle_lifecycle(LifecycleEvent::WillSuspend {
        grace: Duration::from_secs(5),
    });
    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert!(!b.channel.is_connected(), "grace expiry must force the disconnect");
}

#[tokio::test(start_paused = true)]
async fn foreground_cancels_a_pending_drain() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;
    b.channel
        .send_prompt("job", Some(&remote("s1")), "/srv")
        .unwrap();

    b.channel.handle_lifecycle(LifecycleEvent::WillSuspend {
        grace: Duration::from_secs(5),
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    b.channel
        .handle_lifecycle(LifecycleEvent::Foregrounded { reachable: true });

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(b.channel.is_connected(), "cancelled drain must not disconnect");
}

#[tokio::test(start_paused = true)]
async fn foreground_reconnects_only_when_reachable() {
    let b = backend();
    let _ = handshake(&b, "ui-1").await;
    b.channel.disconnect();
    assert_eq!(b.factory.dial_count(), 1);

    b.channel
        .handle_lifecycle(LifecycleEvent::Foregrounded { reachable: false });
    settle().await;
    assert_eq!(b.factory.dial_count(), 1);

    b.channel
        .handle_lifecycle(LifecycleEvent::Foregrounded { reachable: true });
    settle().await;
    assert_eq!(b.factory.dial_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn foreground_does_not_reconnect_when_reauth_required() {
    let b = backend();
    b.channel.connect(LogicalSessionId::from("ui-1"));
    settle().await;
    let server = b.factory.latest_end();
    server.send(&Envelope::Hello {
        protocol_version: 1,
        auth_version: 1,
    });
    settle().await;
    server.send(&Envelope::AuthError {
        reason: "bad key".into(),
    });
    server.close(None);
    settle().await;

    b.channel
        .handle_lifecycle(LifecycleEvent::Foregrounded { reachable: true });
    settle().await;
    assert_eq!(b.factory.dial_count(), 1);
}
