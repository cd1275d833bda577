//! Session controller.
//!
//! Orchestrates the transport, stage tracker, and transcript: one query at a
//! time goes out, the resulting event stream is decoded and folded into
//! session state, and every state change is republished for rendering.

use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

use paperchat_protocol::{ClientQuery, ServerEvent};

use crate::config::Config;

use super::error::{SessionError, SessionResult};
use super::stages::StageTracker;
use super::transcript::{Transcript, Turn};
use super::transport::{Inbound, TransportConfig, WsTransport};

const UPDATE_BUFFER_SIZE: usize = 256;

/// Where the session is in its query lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No query outstanding.
    Idle,
    /// A query was sent and no terminal event has arrived yet.
    Awaiting,
    /// The last query ended in failure. Transient; cleared by the next submit.
    Failed(String),
}

impl SessionStatus {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, SessionStatus::Awaiting)
    }
}

/// Incremental state-change notification for renderers.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// A complete turn entered the transcript (user or info).
    TurnAppended(Turn),
    /// The open assistant turn grew by `delta`.
    AssistantDelta { turn_id: Uuid, delta: String },
    /// The active stage set changed.
    StagesChanged(Vec<String>),
    /// The session status changed.
    StatusChanged(SessionStatus),
    /// An inbound frame could not be decoded; the query continues.
    ProtocolWarning(String),
}

/// Snapshot of everything the presentation layer needs.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub turns: Vec<Turn>,
    pub active_stages: Vec<String>,
    pub busy: bool,
    pub last_error: Option<String>,
    pub thread_id: Option<String>,
}

enum Step {
    Event(Inbound),
    ChannelClosed,
    TimedOut,
}

/// One chat session over one duplex connection.
pub struct ChatSession {
    transport: WsTransport,
    transcript: Transcript,
    stages: StageTracker,
    status: SessionStatus,
    thread_id: Option<String>,
    query_timeout: Option<Duration>,
    /// Inbound frames for the current connection. Replaced wholesale when
    /// the transport re-dials, so a stale connection can never feed events
    /// into a new query.
    events: Option<mpsc::Receiver<Inbound>>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl ChatSession {
    pub fn new(transport: WsTransport, query_timeout: Option<Duration>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER_SIZE);
        Self {
            transport,
            transcript: Transcript::new(),
            stages: StageTracker::new(),
            status: SessionStatus::Idle,
            thread_id: None,
            query_timeout,
            events: None,
            updates,
        }
    }

    /// Build a session from configuration.
    pub fn from_config(config: &Config) -> Self {
        let transport = WsTransport::new(
            config.chat_url.clone(),
            TransportConfig {
                connect_timeout: Duration::from_secs(config.connect_timeout_secs),
                event_buffer_size: config.event_buffer_size,
            },
        );
        let query_timeout = match config.query_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self::new(transport, query_timeout)
    }

    /// Subscribe to incremental state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Current aggregate view: transcript, active stages, busy flag, error.
    pub fn view(&self) -> SessionView {
        SessionView {
            turns: self.transcript.snapshot().to_vec(),
            active_stages: self.stages.snapshot(),
            busy: self.status.is_awaiting(),
            last_error: match &self.status {
                SessionStatus::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            thread_id: self.thread_id.clone(),
        }
    }

    /// Record an out-of-band notice (document uploaded, deleted, ...).
    pub fn note(&mut self, text: &str) {
        let turn = self.transcript.append_info(text).clone();
        self.publish(SessionUpdate::TurnAppended(turn));
    }

    /// Submit a query: validate, reset per-query state, send.
    ///
    /// On success the session is `Awaiting`; call [`drive`](Self::drive) to
    /// consume the reply stream. Submitting while a query is in flight is
    /// rejected without touching session state.
    pub async fn submit(&mut self, text: &str) -> SessionResult<()> {
        if self.status.is_awaiting() {
            return Err(SessionError::QueryInFlight);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyQuery);
        }

        self.stages.reset();
        self.publish(SessionUpdate::StagesChanged(Vec::new()));

        let turn = self.transcript.append_user(text)?.clone();
        self.publish(SessionUpdate::TurnAppended(turn));
        self.transcript.begin_assistant_turn();

        match self.transport.ensure_connected().await {
            Ok(Some(receiver)) => self.events = Some(receiver),
            Ok(None) => {}
            Err(e) => {
                self.abort_submit(&e);
                return Err(e);
            }
        }

        if let Err(e) = self.transport.send(&ClientQuery::new(text)).await {
            self.abort_submit(&e);
            return Err(e);
        }

        self.set_status(SessionStatus::Awaiting);
        Ok(())
    }

    /// Consume inbound frames until the query reaches a terminal state.
    ///
    /// Returns the resulting status. Decode failures are transient: they are
    /// logged, surfaced as [`SessionUpdate::ProtocolWarning`], and the stream
    /// continues.
    pub async fn drive(&mut self) -> SessionResult<SessionStatus> {
        if !self.status.is_awaiting() {
            return Ok(self.status.clone());
        }

        let Some(mut events) = self.events.take() else {
            self.fail_query("not connected", true).await;
            return Ok(self.status.clone());
        };

        let deadline = self.query_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let step = match deadline {
                Some(deadline) => match timeout_at(deadline, events.recv()).await {
                    Ok(Some(inbound)) => Step::Event(inbound),
                    Ok(None) => Step::ChannelClosed,
                    Err(_) => Step::TimedOut,
                },
                None => match events.recv().await {
                    Some(inbound) => Step::Event(inbound),
                    None => Step::ChannelClosed,
                },
            };

            match step {
                Step::TimedOut => {
                    self.fail_query("timed out waiting for the server", true).await;
                    return Ok(self.status.clone());
                }
                Step::ChannelClosed => {
                    self.fail_query("connection closed", true).await;
                    return Ok(self.status.clone());
                }
                Step::Event(Inbound::Closed { reason }) => {
                    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                    self.fail_query(&reason, true).await;
                    return Ok(self.status.clone());
                }
                Step::Event(Inbound::Frame(raw)) => match ServerEvent::parse(&raw) {
                    Err(e) => {
                        let error = SessionError::from(e);
                        warn!("dropping undecodable frame: {error}");
                        self.publish(SessionUpdate::ProtocolWarning(error.to_string()));
                    }
                    Ok(event) => {
                        if self.apply_event(event) {
                            // terminal event; the connection stays usable
                            self.events = Some(events);
                            return Ok(self.status.clone());
                        }
                    }
                },
            }
        }
    }

    /// Submit a query and consume its reply stream to completion.
    pub async fn run(&mut self, text: &str) -> SessionResult<SessionStatus> {
        self.submit(text).await?;
        self.drive().await
    }

    /// Close the connection. A query in flight resolves to `Failed`; there
    /// is no other way to abandon one.
    pub async fn close(&mut self) {
        if self.status.is_awaiting() {
            self.fail_query("connection closed by client", true).await;
        } else {
            self.events = None;
            self.transport.close().await;
        }
    }

    /// Apply one decoded event. Returns true when the query is finished.
    fn apply_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::QueryAccepted { thread_id } => {
                debug!("query bound to thread {thread_id}");
                self.thread_id = Some(thread_id);
                false
            }
            ServerEvent::StageEnter { stage } => {
                if self.stages.enter(&stage) {
                    self.publish(SessionUpdate::StagesChanged(self.stages.snapshot()));
                }
                let turn = self.transcript.append_info(&format!("entering {stage}")).clone();
                self.publish(SessionUpdate::TurnAppended(turn));
                false
            }
            ServerEvent::StageExit { stage } => {
                if self.stages.exit(&stage) {
                    self.publish(SessionUpdate::StagesChanged(self.stages.snapshot()));
                }
                let turn = self.transcript.append_info(&format!("exiting {stage}")).clone();
                self.publish(SessionUpdate::TurnAppended(turn));
                false
            }
            ServerEvent::Fragment { text } => {
                match self.transcript.append_fragment(&text) {
                    Ok(turn) => {
                        let turn_id = turn.id;
                        self.publish(SessionUpdate::AssistantDelta {
                            turn_id,
                            delta: text,
                        });
                    }
                    Err(e) => warn!("dropping fragment: {e}"),
                }
                false
            }
            ServerEvent::Completed => {
                self.transcript.finalize();
                self.set_status(SessionStatus::Idle);
                true
            }
            ServerEvent::Failed { message } => {
                warn!("{}", SessionError::Server(message.clone()));
                self.finish_failed(&message);
                true
            }
        }
    }

    /// Resolve the current query to `Failed` without tearing the channel
    /// down. Used for server-reported errors: the server keeps serving.
    fn finish_failed(&mut self, reason: &str) {
        self.transcript.finalize();
        self.stages.reset();
        self.publish(SessionUpdate::StagesChanged(Vec::new()));
        self.set_status(SessionStatus::Failed(reason.to_string()));
    }

    /// Resolve the current query to `Failed`, optionally discarding the
    /// channel so nothing from the abandoned query can leak into the next.
    async fn fail_query(&mut self, reason: &str, drop_channel: bool) {
        self.finish_failed(reason);
        if drop_channel {
            self.events = None;
            self.transport.close().await;
        }
    }

    /// Connect or send failed during submit: seal the never-used assistant
    /// turn and record the failure.
    fn abort_submit(&mut self, error: &SessionError) {
        self.transcript.finalize();
        self.set_status(SessionStatus::Failed(error.to_string()));
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            self.status = status;
            self.publish(SessionUpdate::StatusChanged(self.status.clone()));
        }
    }

    fn publish(&self, update: SessionUpdate) {
        // nobody listening is fine
        let _ = self.updates.send(update);
    }
}
