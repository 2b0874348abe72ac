//! Socket transport seam.
//!
//! The channel reaches the network through [`SocketFactory`] so tests can
//! substitute a scripted in-process socket. [`TungsteniteFactory`] is the
//! production implementation: it connects, splits the stream, and pumps
//! frames through unbounded channels so the channel's read loop never
//! touches the socket types directly.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Errors from socket establishment.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection attempt failed.
    #[error("socket connect failed: {0}")]
    Connect(String),
}

/// Events surfaced by a connected socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// One inbound text frame.
    Frame(String),
    /// The socket closed, with a reason when one is known.
    Closed(Option<String>),
}

/// A connected socket: an outbound frame sender and an inbound event
/// receiver. Dropping the sender tears the socket down.
pub struct SocketHandle {
    /// Outbound frames (already-encoded JSON).
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound frames and the terminal close event.
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Creates connected sockets.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<SocketHandle, TransportError>;
}

/// Production factory over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteFactory;

#[async_trait]
impl SocketFactory for TungsteniteFactory {
    async fn connect(&self, url: &str) -> Result<SocketHandle, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SocketEvent>();

        // Outbound pump: forward frames until the sender side is dropped or
        // the sink dies.
        let _ = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Inbound pump: surface text frames; the mobile backend may send
        // binary frames carrying UTF-8 JSON.
        let _ = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;
            while let Some(item) = source.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(SocketEvent::Frame(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            if in_tx.send(SocketEvent::Frame(text.to_owned())).is_err() {
                                return;
                            }
                        }
                        Err(_) => {
                            debug!(len = data.len(), "dropping non-UTF8 binary frame");
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        close_reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(e) => {
                        close_reason = Some(e.to_string());
                        break;
                    }
                }
            }
            let _ = in_tx.send(SocketEvent::Closed(close_reason));
        });

        Ok(SocketHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
