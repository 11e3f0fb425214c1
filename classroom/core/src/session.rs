//! Session Client - Connection Lifecycle and Reconnection
//!
//! The `SessionClient` owns one logical connection to the classroom backend.
//! It turns transport callbacks into bus events, submits outbound actions, and
//! runs the bounded reconnect loop.
//!
//! # State Machine
//!
//! ```text
//!                 connect()
//!  Disconnected ─────────────► Connecting
//!       ▲  ▲                       │ opened
//!       │  │    closed(code)       ▼
//!       │  └──────────────────── Open
//!       │                          │ disconnect()
//!       └──────── Closing ◄────────┘
//! ```
//!
//! # Design Philosophy
//!
//! - Each `connect` starts a new *generation*. Events from an older
//!   generation (after `disconnect` or a newer connect) are ignored.
//! - `connect` and `disconnect` are serialized by an async transition lock;
//!   state reads and callback updates use a short `parking_lot` lock that is
//!   never held across `.await` or while publishing.
//! - `send` never suspends: frames go into a bounded queue drained by the
//!   transport writer.
//! - At most one reconnect loop runs per client. Its running flag lives under
//!   the same lock as the state so a close racing with the loop's exit still
//!   schedules a new loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::bus::{BusEvent, EventBus};
use crate::config::SessionConfig;
use crate::events::{OutboundAction, TeacherAction};
use crate::protocol::{self, ProtocolError};
use crate::transport::{
    CloseCode, OutboundFrame, Transport, TransportError, TransportEvent, TransportLink,
};

/// Connection state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection
    #[default]
    Disconnected,
    /// Transport opened, waiting for the handshake to complete
    Connecting,
    /// Ready to send
    Open,
    /// Explicit shutdown in progress
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Session client errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Action submitted while not `Open`
    #[error("Not connected (state: {state})")]
    NotConnected {
        /// State at the time of the call
        state: ConnectionState,
    },

    /// Outbound queue is full
    #[error("Outbound queue full")]
    Backpressure,

    /// Endpoint settings do not form a valid URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// Transport failed to open
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be encoded or validated
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// State shared between the client, its event pump and the reconnect loop
#[derive(Debug, Default)]
struct Shared {
    phase: ConnectionState,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    reconnect_attempts: u32,
    generation: u64,
    reconnect_running: bool,
}

struct Inner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    bus: EventBus,
    shared: Mutex<Shared>,
    auto_reconnect: AtomicBool,
    transition: tokio::sync::Mutex<()>,
}

/// Client for one classroom session
///
/// Cheap to clone; clones drive the same connection.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("SessionClient")
            .field("endpoint", &self.inner.config.endpoint.redacted_url())
            .field("transport", &self.inner.transport.name())
            .field("state", &shared.phase)
            .field("reconnect_attempts", &shared.reconnect_attempts)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client over `transport`, publishing on `bus`
    #[must_use]
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>, bus: EventBus) -> Self {
        let auto_reconnect = AtomicBool::new(config.auto_reconnect);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                bus,
                shared: Mutex::new(Shared::default()),
                auto_reconnect,
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a client over the WebSocket transport
    #[cfg(feature = "websocket")]
    #[must_use]
    pub fn websocket(config: SessionConfig, bus: EventBus) -> Self {
        let transport = crate::transport::WebSocketTransport::new(
            config.connect_timeout,
            config.outbound_capacity,
        );
        Self::new(config, Arc::new(transport), bus)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the connection
    ///
    /// No-op while `Connecting` or `Open`. On failure the client returns to
    /// `Disconnected`, a connection-error event is published and, if
    /// auto-reconnect is on, the reconnect loop is scheduled.
    ///
    /// # Errors
    ///
    /// Returns the open failure; it has already been published on the bus.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.connect_inner(false).await
    }

    async fn connect_inner(&self, from_reconnect: bool) -> Result<(), SessionError> {
        if matches!(self.state(), ConnectionState::Connecting | ConnectionState::Open) {
            tracing::debug!(state = %self.state(), "Connect ignored, session already active");
            return Ok(());
        }

        let _transition = self.inner.transition.lock().await;

        // disconnect() clears the flag before taking the lock
        if from_reconnect && !self.auto_reconnect() {
            return Ok(());
        }

        let generation = {
            let mut shared = self.inner.shared.lock();
            if matches!(
                shared.phase,
                ConnectionState::Connecting | ConnectionState::Open
            ) {
                return Ok(());
            }
            shared.phase = ConnectionState::Connecting;
            shared.generation += 1;
            shared.generation
        };

        let endpoint = &self.inner.config.endpoint;
        let url = match endpoint.url() {
            Ok(url) => url,
            Err(e) => {
                self.inner.shared.lock().phase = ConnectionState::Disconnected;
                tracing::error!(error = %e, host = %endpoint.host, "Invalid endpoint");
                self.inner.bus.publish(BusEvent::ConnectionError {
                    message: format!("invalid endpoint: {e}"),
                });
                return Err(SessionError::InvalidEndpoint(e));
            }
        };

        tracing::info!(
            url = %endpoint.redacted_url(),
            transport = self.inner.transport.name(),
            "Connecting to classroom backend"
        );

        let timeout = self.inner.config.connect_timeout;
        let opened = match tokio::time::timeout(timeout, self.inner.transport.open(&url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match opened {
            Ok(TransportLink { outbound, events }) => {
                {
                    let mut shared = self.inner.shared.lock();
                    if shared.generation != generation {
                        if outbound
                            .try_send(OutboundFrame::Close(CloseCode::NORMAL))
                            .is_err()
                        {
                            tracing::debug!("Superseded connection already gone");
                        }
                        return Ok(());
                    }
                    shared.outbound = Some(outbound);
                }
                tokio::spawn(pump_events(
                    Arc::downgrade(&self.inner),
                    generation,
                    events,
                ));
                Ok(())
            }
            Err(e) => {
                {
                    let mut shared = self.inner.shared.lock();
                    if shared.generation == generation {
                        shared.phase = ConnectionState::Disconnected;
                        shared.outbound = None;
                    }
                }
                tracing::warn!(error = %e, url = %endpoint.redacted_url(), "Connection failed");
                self.inner.bus.publish(BusEvent::ConnectionError {
                    message: e.to_string(),
                });
                self.schedule_reconnect();
                Err(SessionError::Transport(e))
            }
        }
    }

    /// Close the connection and stop reconnecting
    ///
    /// Clears auto-reconnect; call [`set_auto_reconnect`](Self::set_auto_reconnect)
    /// to re-enable it. Safe to call in any state.
    pub async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        let _transition = self.inner.transition.lock().await;

        let (was_live, outbound) = {
            let mut shared = self.inner.shared.lock();
            let was_live = matches!(
                shared.phase,
                ConnectionState::Connecting | ConnectionState::Open
            );
            shared.phase = ConnectionState::Closing;
            shared.generation += 1;
            (was_live, shared.outbound.take())
        };

        if let Some(outbound) = outbound {
            if outbound
                .try_send(OutboundFrame::Close(CloseCode::NORMAL))
                .is_err()
            {
                tracing::debug!("Close frame not queued, writer already gone");
            }
        }

        self.inner.shared.lock().phase = ConnectionState::Disconnected;

        if was_live {
            tracing::info!("Disconnected from classroom backend");
            self.inner.bus.publish(BusEvent::ConnectionClosed {
                code: CloseCode::NORMAL,
            });
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Submit an action without waiting for network I/O
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] unless the state is `Open`
    /// - [`SessionError::Backpressure`] if the outbound queue is full
    pub fn send(&self, action: &OutboundAction) -> Result<(), SessionError> {
        let outbound = self.open_sender()?;
        let frame = protocol::encode_action(action)?;
        Self::submit(&outbound, frame)?;
        tracing::debug!(
            kind = action.kind(),
            student = action.student_id(),
            "Action sent"
        );
        Ok(())
    }

    /// Submit a `student_action`
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_student_action(
        &self,
        student_id: &str,
        action_type: &str,
        content: &str,
    ) -> Result<(), SessionError> {
        self.send(&OutboundAction::student_action(student_id, action_type, content))
    }

    /// Submit a `teacher_input` and publish `CommandSent`
    ///
    /// Empty content becomes `"Teacher triggered <action>"`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send). Nothing is published on failure.
    pub fn send_teacher_command(
        &self,
        student_id: &str,
        action: TeacherAction,
        content: &str,
    ) -> Result<(), SessionError> {
        let config = &self.inner.config;
        let outbound = OutboundAction::teacher_input(
            config.client_source.as_str(),
            config.teacher_id.as_str(),
            student_id,
            action.clone(),
            content,
        );
        self.send(&outbound)?;

        tracing::info!(student = student_id, action = %action, "Teacher command sent");
        self.inner.bus.publish(BusEvent::CommandSent {
            student_id: student_id.to_string(),
            action,
        });
        Ok(())
    }

    /// Submit a caller-built JSON object as-is
    ///
    /// # Errors
    ///
    /// [`SessionError::Protocol`] if `json` is not a JSON object, otherwise
    /// see [`send`](Self::send).
    pub fn send_raw(&self, json: &str) -> Result<(), SessionError> {
        let outbound = self.open_sender()?;
        protocol::validate_raw(json)?;
        Self::submit(&outbound, json.to_string())
    }

    fn open_sender(&self) -> Result<mpsc::Sender<OutboundFrame>, SessionError> {
        let shared = self.inner.shared.lock();
        match (&shared.outbound, shared.phase) {
            (Some(outbound), ConnectionState::Open) => Ok(outbound.clone()),
            (_, state) => {
                tracing::warn!(state = %state, "Send rejected, session not open");
                Err(SessionError::NotConnected { state })
            }
        }
    }

    fn submit(outbound: &mpsc::Sender<OutboundFrame>, frame: String) -> Result<(), SessionError> {
        outbound
            .try_send(OutboundFrame::Text(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Send discarded, outbound queue full");
                    SessionError::Backpressure
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("Send discarded, writer closed");
                    SessionError::NotConnected {
                        state: ConnectionState::Disconnected,
                    }
                }
            })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().phase
    }

    /// Whether the state is `Open`
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Reconnect attempts since the last successful open
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    /// Whether the client reconnects after failures
    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Enable or disable reconnecting
    ///
    /// Disabling stops a running reconnect loop at its next check.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    /// Bus this client publishes on
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Client settings
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Full connection URL, including the token
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint settings do not form a valid URL.
    pub fn connection_url(&self) -> Result<Url, SessionError> {
        Ok(self.inner.config.endpoint.url()?)
    }

    // =========================================================================
    // Transport callbacks
    // =========================================================================

    /// Apply one transport event; returns false once the link is finished
    fn handle_event(&self, generation: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Opened => {
                {
                    let mut shared = self.inner.shared.lock();
                    if shared.generation != generation {
                        return false;
                    }
                    shared.phase = ConnectionState::Open;
                    shared.reconnect_attempts = 0;
                }
                tracing::info!(
                    room = %self.inner.config.endpoint.room_id,
                    "Connected to classroom backend"
                );
                self.inner.bus.publish(BusEvent::ConnectionOpened);
                true
            }
            TransportEvent::Closed(code) => {
                self.handle_closed(generation, code);
                false
            }
            TransportEvent::Error(message) => {
                tracing::warn!(error = %message, "Transport error");
                self.inner
                    .bus
                    .publish(BusEvent::ConnectionError { message });
                true
            }
            TransportEvent::Message(text) => {
                match protocol::decode_response(&text) {
                    Ok(response) => {
                        tracing::debug!(
                            animation = %response.animation,
                            emotion = %response.emotion,
                            "Decision response received"
                        );
                        self.inner
                            .bus
                            .publish(BusEvent::DecisionResponse(Arc::new(response)));
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            frame = protocol::preview(&text),
                            "Dropping undecodable frame"
                        );
                    }
                }
                true
            }
        }
    }

    fn handle_closed(&self, generation: u64, code: CloseCode) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.phase = ConnectionState::Disconnected;
            shared.outbound = None;
        }

        if code == CloseCode::TOKEN_REJECTED {
            tracing::warn!(code = %code, "Backend rejected the auth token");
        } else if code.is_normal() {
            tracing::info!(code = %code, "Connection closed");
        } else {
            tracing::warn!(code = %code, "Connection closed abnormally");
        }

        self.inner.bus.publish(BusEvent::ConnectionClosed { code });

        if !code.is_normal() {
            self.schedule_reconnect();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.shared.lock().generation == generation
    }

    // =========================================================================
    // Reconnection
    // =========================================================================

    fn schedule_reconnect(&self) {
        if !self.auto_reconnect() {
            return;
        }
        {
            let mut shared = self.inner.shared.lock();
            if shared.reconnect_running {
                tracing::debug!("Reconnect loop already running");
                return;
            }
            shared.reconnect_running = true;
        }
        tokio::spawn(reconnect_loop(Arc::downgrade(&self.inner)));
    }

    /// Decide the next reconnect step
    ///
    /// Returns the backoff delay for a new attempt, or `None` after clearing
    /// the running flag.
    fn next_reconnect_attempt(&self) -> Option<Duration> {
        let config = &self.inner.config;
        let auto_reconnect = self.auto_reconnect();

        let attempt = {
            let mut shared = self.inner.shared.lock();
            if !auto_reconnect || shared.phase == ConnectionState::Open {
                shared.reconnect_running = false;
                return None;
            }
            let max = config.max_reconnect_attempts;
            if max > 0 && shared.reconnect_attempts >= max {
                shared.reconnect_running = false;
                let attempts = shared.reconnect_attempts;
                drop(shared);
                tracing::error!(attempts, "Max reconnect attempts reached, giving up");
                self.inner
                    .bus
                    .publish(BusEvent::ReconnectExhausted { attempts });
                return None;
            }
            shared.reconnect_attempts += 1;
            shared.reconnect_attempts
        };

        let delay = config
            .reconnect_policy
            .delay(config.reconnect_delay, attempt);
        tracing::info!(
            attempt,
            max = config.max_reconnect_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );
        self.inner.bus.publish(BusEvent::Reconnecting { attempt });
        Some(delay)
    }

    fn clear_reconnect_running(&self) {
        self.inner.shared.lock().reconnect_running = false;
    }
}

/// Forward transport events of one generation to the client
async fn pump_events(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let client = SessionClient { inner };
        if !client.is_current(generation) {
            tracing::debug!(generation, "Ignoring event from superseded connection");
            return;
        }
        if !client.handle_event(generation, event) {
            return;
        }
    }

    // Stream ended without a close frame
    if let Some(inner) = inner.upgrade() {
        let client = SessionClient { inner };
        client.handle_closed(generation, CloseCode::ABNORMAL);
    }
}

async fn reconnect_loop(inner: Weak<Inner>) {
    loop {
        let (delay, grace) = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let client = SessionClient { inner };
            match client.next_reconnect_attempt() {
                Some(delay) => (delay, client.inner.config.connect_grace),
                None => return,
            }
        };

        tokio::time::sleep(delay).await;

        {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let client = SessionClient { inner };
            if !client.auto_reconnect() {
                tracing::debug!("Reconnect cancelled");
                client.clear_reconnect_running();
                return;
            }
            // Failures are already published by connect
            if let Err(e) = client.connect_inner(true).await {
                tracing::debug!(error = %e, "Reconnect attempt failed");
            }
        }

        tokio::time::sleep(grace).await;
    }
}
