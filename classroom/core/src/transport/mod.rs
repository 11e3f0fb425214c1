//! Transport Layer for Front-end to Backend IPC
//!
//! Provides abstraction over the connection to the classroom backend:
//! - `WebSocket`: the production path (`ws://` / `wss://`)
//! - `InProcess`: direct channels, for embedding and tests
//!
//! # Design Philosophy
//!
//! The transport layer separates the communication mechanism from the
//! session state machine. The `SessionClient` only sees a [`TransportLink`]
//! (outbound queue + ordered callback events), so reconnect logic and the
//! protocol can be exercised without a network.

pub mod config;
pub mod in_process;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use config::{EndpointConfig, Scheme, DEFAULT_PATH};
pub use in_process::{InProcessAcceptor, InProcessPeer, InProcessTransport};
pub use traits::{
    CloseCode, OutboundFrame, Transport, TransportError, TransportEvent, TransportLink,
};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
