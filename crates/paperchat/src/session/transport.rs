//! WebSocket transport session.
//!
//! Owns the duplex connection to the answer service. Inbound frames are
//! pushed by a spawned reader task into a bounded channel; the session
//! controller consumes them. The transport never interprets chat semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use paperchat_protocol::ClientQuery;

use super::error::{SessionError, SessionResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long to wait for the connection to open.
    pub connect_timeout: Duration,
    /// Buffer size for the inbound frame channel.
    pub event_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            event_buffer_size: 256,
        }
    }
}

/// What the reader task delivers to the consumer.
#[derive(Debug)]
pub enum Inbound {
    /// One inbound text frame, undecoded.
    Frame(String),
    /// The channel is gone: server close frame, protocol error, or EOF.
    Closed { reason: Option<String> },
}

struct Channel {
    writer: SplitSink<WsStream, Message>,
    alive: Arc<AtomicBool>,
}

/// One duplex connection to the answer service, re-dialed on demand.
pub struct WsTransport {
    url: String,
    config: TransportConfig,
    // Also serializes concurrent connect attempts: callers queue on the lock
    // and every caller after the first finds a ready channel.
    channel: Mutex<Option<Channel>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            url: url.into(),
            config,
            channel: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make sure a live channel exists, dialing a new one if needed.
    ///
    /// Returns `Some(receiver)` when a new connection was opened; the caller
    /// must adopt it as the inbound frame source, dropping any receiver from
    /// a previous connection. Returns `None` when the existing channel is
    /// still good.
    pub async fn ensure_connected(&self) -> SessionResult<Option<mpsc::Receiver<Inbound>>> {
        let mut guard = self.channel.lock().await;

        if let Some(channel) = guard.as_ref() {
            if channel.alive.load(Ordering::SeqCst) {
                return Ok(None);
            }
            debug!("previous channel is dead, reconnecting");
        }

        info!("connecting to {}", self.url);
        let connect = connect_async(self.url.as_str());
        let (stream, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                SessionError::Transport(format!("timed out connecting to {}", self.url))
            })?
            .map_err(|e| SessionError::Transport(format!("failed to connect to {}: {e}", self.url)))?;

        let (writer, reader) = stream.split();
        let (frame_tx, frame_rx) = mpsc::channel(self.config.event_buffer_size);
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(read_loop(reader, frame_tx, Arc::clone(&alive)));

        *guard = Some(Channel { writer, alive });
        Ok(Some(frame_rx))
    }

    /// Send one query frame. Requires a ready channel.
    pub async fn send(&self, query: &ClientQuery) -> SessionResult<()> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(SessionError::NotConnected)?;

        if !channel.alive.load(Ordering::SeqCst) {
            *guard = None;
            return Err(SessionError::NotConnected);
        }

        let frame = query
            .to_frame()
            .map_err(|e| SessionError::Transport(format!("failed to encode query: {e}")))?;

        match channel.writer.send(Message::Text(frame.into())).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // the channel is unusable now; drop it so the next submit re-dials
                *guard = None;
                Err(SessionError::Transport(format!("send failed: {e}")))
            }
        }
    }

    /// Tear down the current channel, abandoning any query in flight.
    pub async fn close(&self) {
        let mut guard = self.channel.lock().await;
        if let Some(mut channel) = guard.take() {
            channel.alive.store(false, Ordering::SeqCst);
            let _ = channel.writer.send(Message::Close(None)).await;
            debug!("channel closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        let guard = self.channel.lock().await;
        guard
            .as_ref()
            .map(|channel| channel.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    frame_tx: mpsc::Sender<Inbound>,
    alive: Arc<AtomicBool>,
) {
    debug!("reader task started");
    while let Some(result) = reader.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if frame_tx
                    .send(Inbound::Frame(text.as_str().to_owned()))
                    .await
                    .is_err()
                {
                    // consumer is gone; nothing left to deliver to
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_owned())
                    .filter(|r| !r.is_empty());
                let _ = frame_tx.send(Inbound::Closed { reason }).await;
                break;
            }
            // ping/pong are handled at the protocol layer; binary is not
            // part of this protocol
            Ok(_) => {}
            Err(e) => {
                warn!("websocket read error: {e}");
                let _ = frame_tx
                    .send(Inbound::Closed {
                        reason: Some(e.to_string()),
                    })
                    .await;
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("reader task ended");
}
