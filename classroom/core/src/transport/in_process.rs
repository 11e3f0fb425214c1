//! In-Process Transport
//!
//! Channel-based transport for embedding a backend in the same process and
//! for driving a `SessionClient` from tests.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, mut acceptor) = InProcessTransport::new_pair();
//! let client = SessionClient::new(config, Arc::new(transport), EventBus::new());
//!
//! client.connect().await?;
//! let mut peer = acceptor.accept().await.unwrap();
//! peer.open().await;
//! peer.push_text(r#"{"animation":"wave","reply_text":"Hi"}"#).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::traits::{
    CloseCode, OutboundFrame, Transport, TransportError, TransportEvent, TransportLink,
};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 100;

/// In-process transport using tokio channels
///
/// Every successful `open` yields an [`InProcessPeer`] on the paired
/// [`InProcessAcceptor`]. The peer plays the backend: it decides when the
/// connection opens or closes and what it says.
pub struct InProcessTransport {
    /// Hands new peers to the acceptor
    peer_tx: mpsc::UnboundedSender<InProcessPeer>,
    /// When set, `open` fails as if the backend were unreachable
    refuse: Arc<AtomicBool>,
    /// Number of `open` calls, successful or not
    attempts: Arc<AtomicUsize>,
    /// Last URL passed to `open`
    last_url: Arc<Mutex<Option<Url>>>,
    /// Capacity of each link's channels
    capacity: usize,
}

impl InProcessTransport {
    /// Create a transport and the acceptor that receives its connections
    #[must_use]
    pub fn new_pair() -> (Self, InProcessAcceptor) {
        Self::new_pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with custom per-link channel capacity
    #[must_use]
    pub fn new_pair_with_capacity(capacity: usize) -> (Self, InProcessAcceptor) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let transport = Self {
            peer_tx,
            refuse: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
            last_url: Arc::new(Mutex::new(None)),
            capacity: capacity.max(1),
        };
        (transport, InProcessAcceptor { peer_rx })
    }

    /// Make subsequent `open` calls fail (or succeed again)
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Handle for toggling refusal after the transport has been moved
    #[must_use]
    pub fn refuse_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.refuse)
    }

    /// Number of `open` calls so far
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Counter handle for reading attempts after the transport has been moved
    #[must_use]
    pub fn attempts_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }

    /// Last URL passed to `open`
    #[must_use]
    pub fn last_url(&self) -> Option<Url> {
        self.last_url.lock().clone()
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock() = Some(url.clone());

        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "connection refused: {}",
                url.host_str().unwrap_or("unknown host")
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.capacity);
        let (events_tx, events_rx) = mpsc::channel(self.capacity);

        let peer = InProcessPeer {
            url: url.clone(),
            outbound: outbound_rx,
            events: events_tx,
        };
        self.peer_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("acceptor dropped".to_string()))?;

        Ok(TransportLink {
            outbound: outbound_tx,
            events: events_rx,
        })
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

/// Receives connections opened through an [`InProcessTransport`]
pub struct InProcessAcceptor {
    peer_rx: mpsc::UnboundedReceiver<InProcessPeer>,
}

impl InProcessAcceptor {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<InProcessPeer> {
        self.peer_rx.recv().await
    }

    /// Take a pending connection without waiting
    pub fn try_accept(&mut self) -> Option<InProcessPeer> {
        self.peer_rx.try_recv().ok()
    }
}

/// Backend side of one in-process connection
pub struct InProcessPeer {
    /// URL the client connected to
    pub url: Url,
    outbound: mpsc::Receiver<OutboundFrame>,
    events: mpsc::Sender<TransportEvent>,
}

impl InProcessPeer {
    /// Complete the handshake
    pub async fn open(&self) -> bool {
        self.emit(TransportEvent::Opened).await
    }

    /// Close the connection with `code`
    pub async fn close(&self, code: CloseCode) -> bool {
        self.emit(TransportEvent::Closed(code)).await
    }

    /// Report a transport error
    pub async fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into())).await
    }

    /// Push one inbound text frame
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into())).await
    }

    /// Deliver an arbitrary event; returns false once the client stopped listening
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Wait for the next frame the client wrote
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.recv().await
    }

    /// Take a written frame without waiting
    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.try_recv().ok()
    }

    /// Drain every frame written so far
    pub fn drain_frames(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
