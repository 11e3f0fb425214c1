//! Classroom Core - Session Client for Virtual Classroom Front-ends
//!
//! This crate connects a front-end (3D classroom, teacher panel, headless
//! bot) to the classroom decision backend, completely independent of any
//! rendering engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Front-end Consumers                      │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────┐              │
//! │  │  Student   │  │   Teacher    │  │   Console /  │              │
//! │  │ Characters │  │    Panel     │  │   Headless   │              │
//! │  └─────┬──────┘  └──────┬───────┘  └──────┬───────┘              │
//! │        └── subscribe ───┴──── send ───────┘                      │
//! └─────────────────────────┬────────────────────────────────────────┘
//!                           │
//! ┌─────────────────────────┼────────────────────────────────────────┐
//! │                   CLASSROOM CORE                                 │
//! │  ┌──────────┐   ┌───────┴───────┐   ┌──────────┐   ┌──────────┐  │
//! │  │ EventBus │◄──┤ SessionClient ├──►│ protocol ├──►│transport │  │
//! │  └──────────┘   └───────────────┘   └──────────┘   └────┬─────┘  │
//! └─────────────────────────────────────────────────────────┼────────┘
//!                                                           │ ws://
//!                                                  classroom backend
//! ```
//!
//! # Key Types
//!
//! - [`SessionClient`]: Connection lifecycle, sending, reconnection
//! - [`EventBus`]: Topic-keyed publish/subscribe for consumers
//! - [`DecisionResponse`]: One decision pushed by the backend
//! - [`OutboundAction`]: Student actions and teacher commands
//! - [`SessionConfig`]: Endpoint and reconnect settings
//!
//! # Quick Start
//!
//! ```ignore
//! use classroom_core::{EventBus, SessionClient, SessionConfig, TeacherAction};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = EventBus::new();
//!     bus.on_decision(|response| {
//!         println!("{} says {:?}", response.animation_trigger(), response.reply_text);
//!         Ok(())
//!     });
//!
//!     let client = SessionClient::websocket(SessionConfig::from_env()?, bus);
//!     client.connect().await?;
//!
//!     // once ConnectionOpened has been published
//!     client.send_teacher_command("student_001", TeacherAction::Praise, "Great job!")?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`bus`]: Event bus and bus event types
//! - [`config`]: Session settings, TOML file and environment loading
//! - [`events`]: Outbound actions sent to the backend
//! - [`messages`]: Decision responses received from the backend
//! - [`protocol`]: JSON frame encoding and decoding
//! - [`session`]: The session client state machine
//! - [`transport`]: Connection abstraction (WebSocket, in-process)
//!
//! # No Engine Dependencies
//!
//! This crate has **zero** dependencies on rendering or UI frameworks.
//! Consumers only see bus events and typed messages.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod config;
pub mod events;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use bus::{BusEvent, EventBus, HandlerResult, PublishReport, SubscriptionId, Topic};
pub use events::{OutboundAction, StudentActionData, TeacherAction, TeacherInputData};
pub use messages::{
    AnimationTrigger, DecisionResponse, DecisionTrace, Emotion, ResponseMeta, StateSnapshot,
    StudentState,
};
pub use protocol::{decode_response, encode_action, ProtocolError, MAX_FRAME_SIZE};
pub use session::{ConnectionState, SessionClient, SessionError};

// Transport exports
pub use transport::{
    CloseCode, EndpointConfig, InProcessTransport, Scheme, Transport, TransportError,
    TransportEvent,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, LoadedConfig, ReconnectPolicy, SessionConfig,
};
