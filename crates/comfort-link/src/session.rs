//! Link session: connection lifecycle, read loop, outbound commands
//!
//! The session owns one transport connection and its state machine:
//!
//! ```text
//! Disconnected → (connect) → Connecting → Connected → (start) → Running
//! Running → (stop or transport fault) → Disconnected
//! ```
//!
//! `Error` is a transient sub-state entered on a transport fault; it
//! immediately forces Disconnected. The session never auto-retries;
//! reconnecting is an explicit operation of whoever owns the session.
//!
//! The read loop is the sole producer of inbound events, and it only ever
//! talks to observers through the event bus, so a slow or failing subscriber
//! cannot stall or crash it. `send()` is safe to call concurrently with the
//! read loop: the write half sits behind its own lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use coordination::events::{BusEvent, EventBus, SharedEventBus};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{FeedbackFrame, Frame, ProtocolCodec, SensorFrame};
use crate::dedup::{Category, DedupGate};
use crate::transport::{BoxedReader, BoxedWriter, ConnError, LinkConnector};

/// Connection lifecycle state, owned exclusively by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Running,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Running => write!(f, "running"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Events published by the link session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        timestamp: DateTime<Utc>,
    },
    /// A decoded sensor reading; supersedes any previous one
    Sensor { frame: SensorFrame },
    /// A feedback-button event, for the persistence collaborator
    Feedback {
        frame: FeedbackFrame,
        timestamp: DateTime<Utc>,
    },
    /// Changed `Status:` line from the peer
    PeerStatus {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Changed `Action:` line from the peer
    PeerAction {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Free-text diagnostic line from the peer
    PeerInfo {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// An outbound command changed (the write itself is never deduped)
    CommandSent {
        payload: String,
        timestamp: DateTime<Utc>,
    },
    /// Transport fault or undecodable line; never fatal to the process
    LinkError {
        detail: String,
        timestamp: DateTime<Utc>,
    },
}

impl BusEvent for LinkEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::Sensor { .. } => "sensor",
            Self::Feedback { .. } => "feedback",
            Self::PeerStatus { .. } => "peer_status",
            Self::PeerAction { .. } => "peer_action",
            Self::PeerInfo { .. } => "peer_info",
            Self::CommandSent { .. } => "command_sent",
            Self::LinkError { .. } => "link_error",
        }
    }
}

/// Bus carrying link-side events
pub type LinkBus = EventBus<LinkEvent>;

/// Shared reference to the link-side bus
pub type SharedLinkBus = SharedEventBus<LinkEvent>;

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("link is not connected")]
    NotConnected,

    #[error("link is not running")]
    NotRunning,

    #[error(transparent)]
    Conn(#[from] ConnError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Timing knobs for the session
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Per-iteration read timeout of the read loop
    pub read_timeout: Duration,
    /// Bounded wait for the read loop to exit during `stop()`
    pub stop_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Connection telemetry snapshot
#[derive(Debug, Clone, Serialize)]
pub struct LinkTelemetry {
    pub state: ConnectionState,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub connected_at: Option<DateTime<Utc>>,
}

/// One live link to the sensor board
pub struct LinkSession {
    connector: Arc<dyn LinkConnector>,
    codec: ProtocolCodec,
    config: LinkConfig,
    events: SharedLinkBus,
    state: Arc<StdMutex<ConnectionState>>,
    gates: Arc<StdMutex<DedupGate>>,
    reader: StdMutex<Option<BoxedReader>>,
    writer: Mutex<Option<BoxedWriter>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    cancel: StdMutex<Option<CancellationToken>>,
    packets_sent: AtomicU64,
    packets_received: Arc<AtomicU64>,
    connected_at: StdMutex<Option<DateTime<Utc>>>,
}

impl LinkSession {
    /// Create a session over `connector`, publishing on `events`
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        codec: ProtocolCodec,
        config: LinkConfig,
        events: SharedLinkBus,
    ) -> Self {
        Self {
            connector,
            codec,
            config,
            events,
            state: Arc::new(StdMutex::new(ConnectionState::Disconnected)),
            gates: Arc::new(StdMutex::new(DedupGate::new())),
            reader: StdMutex::new(None),
            writer: Mutex::new(None),
            read_task: Mutex::new(None),
            cancel: StdMutex::new(None),
            packets_sent: AtomicU64::new(0),
            packets_received: Arc::new(AtomicU64::new(0)),
            connected_at: StdMutex::new(None),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connection telemetry snapshot
    pub fn telemetry(&self) -> LinkTelemetry {
        LinkTelemetry {
            state: self.state(),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            connected_at: *self
                .connected_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Open the transport.
    ///
    /// A no-op returning `Ok` when already connected or running, and also
    /// while another `connect()` is still in flight, so racing callers
    /// cannot open two streams and leak one. On failure an error event
    /// fires and the state stays Disconnected.
    pub async fn connect(&self) -> SessionResult<()> {
        // Claim the Connecting state under the lock so exactly one caller
        // proceeds to open the transport.
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                ConnectionState::Connected | ConnectionState::Running => {
                    debug!("connect() on an already-connected session is a no-op");
                    return Ok(());
                }
                ConnectionState::Connecting => {
                    debug!("connect() while another connect is in flight is a no-op");
                    return Ok(());
                }
                ConnectionState::Disconnected | ConnectionState::Error => {
                    std::mem::replace(&mut *state, ConnectionState::Connecting)
                }
            }
        };
        debug!(%from, to = %ConnectionState::Connecting, "Link state changed");
        self.events.publish(LinkEvent::StateChanged {
            from,
            to: ConnectionState::Connecting,
            timestamp: Utc::now(),
        });

        match self.connector.open().await {
            Ok(pair) => {
                *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.reader);
                *self.writer.lock().await = Some(pair.writer);
                *self
                    .connected_at
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

                transition(&self.state, &self.events, ConnectionState::Connected);
                info!("Link connected");
                Ok(())
            }
            Err(e) => {
                self.events.publish(LinkEvent::LinkError {
                    detail: format!("connection failed: {e}"),
                    timestamp: Utc::now(),
                });
                transition(&self.state, &self.events, ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Spawn the read loop and enter Running. Requires Connected.
    pub async fn start(&self) -> SessionResult<()> {
        match self.state() {
            ConnectionState::Running => return Ok(()),
            ConnectionState::Connected => {}
            _ => return Err(SessionError::NotConnected),
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SessionError::NotConnected)?;

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        // Running must be set before the loop exists: a loop that faults on
        // its first read only ever downgrades the state, and its
        // Error/Disconnected transitions have to land after this one.
        transition(&self.state, &self.events, ConnectionState::Running);

        let read_loop = ReadLoop {
            lines: BufReader::new(reader).lines(),
            codec: self.codec.clone(),
            events: self.events.clone(),
            gates: self.gates.clone(),
            state: self.state.clone(),
            received: self.packets_received.clone(),
            cancel,
            read_timeout: self.config.read_timeout,
        };
        *self.read_task.lock().await = Some(tokio::spawn(read_loop.run()));

        info!("Link running");
        Ok(())
    }

    /// Encode and write one command. Requires Running.
    ///
    /// The write always goes to the wire; the `CommandSent` notification is
    /// suppressed while the command text is unchanged.
    pub async fn send(&self, command: &str) -> SessionResult<()> {
        if self.state() != ConnectionState::Running {
            return Err(SessionError::NotRunning);
        }

        let line = self.codec.encode(command);

        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(SessionError::NotRunning)?;

            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await
            }
            .await;

            if let Err(e) = written {
                let detail = format!("failed to send command: {e}");
                self.cancel_read_loop();
                fault(&self.state, &self.events, detail);
                return Err(ConnError::IoFailure(e).into());
            }
        }

        self.packets_sent.fetch_add(1, Ordering::Relaxed);

        if self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(Category::Command, command)
        {
            info!(command, "Command sent");
            self.events.publish(LinkEvent::CommandSent {
                payload: command.to_string(),
                timestamp: Utc::now(),
            });
        }

        Ok(())
    }

    /// Stop the read loop, close the transport, and return to Disconnected.
    ///
    /// Safe to call from any state, including a never-started session. The
    /// read loop is joined with a bounded wait and aborted if it overruns.
    pub async fn stop(&self) {
        self.cancel_read_loop();

        if let Some(mut task) = self.read_task.lock().await.take() {
            match timeout(self.config.stop_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Read loop task failed during shutdown"),
                Err(_) => {
                    warn!("Read loop did not exit within the bounded wait; aborting it");
                    task.abort();
                }
            }
        }

        *self.writer.lock().await = None;
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        transition(&self.state, &self.events, ConnectionState::Disconnected);
        info!("Link stopped");
    }

    fn cancel_read_loop(&self) {
        if let Some(cancel) = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
        }
    }
}

/// Move the session to `to`, publishing the change. No-op if unchanged.
fn transition(state: &StdMutex<ConnectionState>, events: &SharedLinkBus, to: ConnectionState) {
    let from = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == to {
            return;
        }
        std::mem::replace(&mut *state, to)
    };

    debug!(%from, %to, "Link state changed");
    events.publish(LinkEvent::StateChanged {
        from,
        to,
        timestamp: Utc::now(),
    });
}

/// Transport fault: error event, then Error, then forced Disconnected.
fn fault(state: &StdMutex<ConnectionState>, events: &SharedLinkBus, detail: String) {
    warn!(detail, "Link fault");
    events.publish(LinkEvent::LinkError {
        detail,
        timestamp: Utc::now(),
    });
    transition(state, events, ConnectionState::Error);
    transition(state, events, ConnectionState::Disconnected);
}

/// The background half of a running session
struct ReadLoop {
    lines: Lines<BufReader<BoxedReader>>,
    codec: ProtocolCodec,
    events: SharedLinkBus,
    gates: Arc<StdMutex<DedupGate>>,
    state: Arc<StdMutex<ConnectionState>>,
    received: Arc<AtomicU64>,
    cancel: CancellationToken,
    read_timeout: Duration,
}

impl ReadLoop {
    async fn run(mut self) {
        debug!("Read loop started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = timeout(self.read_timeout, self.lines.next_line()) => match result {
                    // Quiet timeout with no data.
                    Err(_) => continue,
                    Ok(Ok(Some(line))) => self.handle_line(line.trim()),
                    Ok(Ok(None)) => {
                        fault(&self.state, &self.events, "peer closed the link".to_string());
                        return;
                    }
                    Ok(Err(e)) => {
                        fault(&self.state, &self.events, format!("link read failed: {e}"));
                        return;
                    }
                },
            }
        }

        debug!("Read loop stopped");
    }

    fn handle_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }

        let frame = match self.codec.decode(line) {
            Ok(Some(frame)) => frame,
            // Suppressed echo or leniently ignored line.
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable line");
                self.events.publish(LinkEvent::LinkError {
                    detail: e.to_string(),
                    timestamp: Utc::now(),
                });
                return;
            }
        };

        match frame {
            Frame::Sensor(frame) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                self.events.publish(LinkEvent::Sensor { frame });
            }
            Frame::Feedback(frame) => {
                self.events.publish(LinkEvent::Feedback {
                    frame,
                    timestamp: Utc::now(),
                });
            }
            Frame::Status(text) => self.emit_deduped(Category::Status, text),
            Frame::Action(text) => self.emit_deduped(Category::Action, text),
            Frame::Info(text) => {
                self.events.publish(LinkEvent::PeerInfo {
                    text,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn emit_deduped(&self, category: Category, text: String) {
        let changed = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(category, &text);

        if !changed {
            return;
        }

        let timestamp = Utc::now();
        let event = match category {
            Category::Status => LinkEvent::PeerStatus { text, timestamp },
            Category::Action => LinkEvent::PeerAction { text, timestamp },
            Category::Command => LinkEvent::CommandSent {
                payload: text,
                timestamp,
            },
        };
        self.events.publish(event);
    }
}
