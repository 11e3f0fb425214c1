//! Transport Traits
//!
//! A transport opens one duplex text connection and hands back a
//! [`TransportLink`]: a bounded sender for outbound frames and a receiver of
//! [`TransportEvent`]s. The four callbacks of a socket API (opened, closed,
//! error, message) arrive in order on that single receiver.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open the connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Handshake did not finish in time
    #[error("connection timed out after {0} ms")]
    Timeout(u64),

    /// Connection already closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing a frame failed
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// WebSocket-style close code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure
    pub const NORMAL: Self = Self(1000);
    /// Peer is going away (server shutdown, page unload)
    pub const GOING_AWAY: Self = Self(1001);
    /// Connection dropped without a close frame
    pub const ABNORMAL: Self = Self(1006);
    /// Backend rejected the auth token
    pub const TOKEN_REJECTED: Self = Self(4003);

    /// Whether this is an orderly, intended close
    #[must_use]
    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::NORMAL => "normal",
            Self::GOING_AWAY => "going away",
            Self::ABNORMAL => "abnormal",
            Self::TOKEN_REJECTED => "token rejected",
            _ => "other",
        };
        write!(f, "{} ({})", self.0, name)
    }
}

/// Callback events delivered by an open connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished; the connection is usable
    Opened,
    /// Connection closed with the given code; no further events follow
    Closed(CloseCode),
    /// Transport-level error; a `Closed` usually follows
    Error(String),
    /// One inbound text frame
    Message(String),
}

/// Frames handed to the transport writer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// One text frame
    Text(String),
    /// Close the connection with the given code
    Close(CloseCode),
}

/// Handles to one open connection
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound frames (bounded; never awaited by `send`)
    pub outbound: mpsc::Sender<OutboundFrame>,
    /// Callback events, in arrival order
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Something that can open a duplex text connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`
    ///
    /// Resolves once the connection attempt has been handed to the I/O
    /// layer. The link's first event is `Opened` when the handshake succeeds.
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
