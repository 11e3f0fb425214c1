//! Event Bus - Publish/Subscribe for Session Consumers
//!
//! The `EventBus` lets any number of consumers (character controllers,
//! teacher panels, debug dashboards) observe the session without holding a
//! reference to the transport.
//!
//! # Architecture
//!
//! ```text
//!                          EventBus
//!            ┌──────────────────────────────────────┐
//!  publish ─►│ HashMap<Topic, Vec<(id, handler)>>   │
//!            │   - wrapped in Arc<RwLock<>>         │
//!            └───────────────┬──────────────────────┘
//!                            │ in registration order
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!         handler #1    handler #2    handler #3
//! ```
//!
//! # Delivery Rules
//!
//! - Handlers run synchronously on the publishing task, in registration order
//! - Every handler registered when `publish` starts is called exactly once
//! - A handler that returns an error or panics is logged and skipped; the
//!   remaining handlers still run
//! - Handlers are invoked outside the registry lock, so a handler may
//!   subscribe or unsubscribe without deadlocking
//!
//! # Thread Safety
//!
//! The registry uses `Arc<RwLock<>>`. Publishing only takes the read lock
//! long enough to snapshot the handler list.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::TeacherAction;
use crate::messages::DecisionResponse;
use crate::transport::CloseCode;

/// Result returned by bus handlers
pub type HandlerResult = anyhow::Result<()>;

type Handler = Arc<dyn Fn(&BusEvent) -> HandlerResult + Send + Sync>;

/// Subscription topics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Connection reached `Open`
    ConnectionOpened,
    /// Connection closed
    ConnectionClosed,
    /// Transport or connect failure
    ConnectionError,
    /// A decoded decision response arrived
    DecisionResponse,
    /// A teacher command was submitted
    CommandSent,
    /// The reconnect loop is about to try again
    Reconnecting,
    /// The reconnect loop gave up
    ReconnectExhausted,
}

impl Topic {
    /// Every topic
    pub const ALL: [Topic; 7] = [
        Self::ConnectionOpened,
        Self::ConnectionClosed,
        Self::ConnectionError,
        Self::DecisionResponse,
        Self::CommandSent,
        Self::Reconnecting,
        Self::ReconnectExhausted,
    ];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionOpened => "connection-opened",
            Self::ConnectionClosed => "connection-closed",
            Self::ConnectionError => "connection-error",
            Self::DecisionResponse => "decision-response",
            Self::CommandSent => "command-sent",
            Self::Reconnecting => "reconnecting",
            Self::ReconnectExhausted => "reconnect-exhausted",
        };
        f.write_str(name)
    }
}

/// Events published on the bus
///
/// Payloads are read-only for handlers; the decision response is shared
/// behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    /// Connection reached `Open`
    ConnectionOpened,
    /// Connection closed
    ConnectionClosed {
        /// Close code reported by the transport
        code: CloseCode,
    },
    /// Transport or connect failure
    ConnectionError {
        /// Human-readable description
        message: String,
    },
    /// A decoded decision response arrived
    DecisionResponse(Arc<DecisionResponse>),
    /// A teacher command was submitted
    CommandSent {
        /// Target student
        student_id: String,
        /// Action sent
        action: TeacherAction,
    },
    /// The reconnect loop is about to try again
    Reconnecting {
        /// Attempt number since the last successful open (1-based)
        attempt: u32,
    },
    /// The reconnect loop gave up
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },
}

impl BusEvent {
    /// Topic this event is delivered on
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::ConnectionOpened => Topic::ConnectionOpened,
            Self::ConnectionClosed { .. } => Topic::ConnectionClosed,
            Self::ConnectionError { .. } => Topic::ConnectionError,
            Self::DecisionResponse(_) => Topic::DecisionResponse,
            Self::CommandSent { .. } => Topic::CommandSent,
            Self::Reconnecting { .. } => Topic::Reconnecting,
            Self::ReconnectExhausted { .. } => Topic::ReconnectExhausted,
        }
    }
}

/// Identifies one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one `publish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Topic published on
    pub topic: Topic,
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

impl PublishReport {
    /// Whether every handler succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<Topic, Vec<Subscriber>>,
}

/// Topic-keyed publish/subscribe registry
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.read();
        let counts: HashMap<Topic, usize> = registry
            .topics
            .iter()
            .map(|(topic, subs)| (*topic, subs.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`
    ///
    /// Handlers on the same topic run in registration order.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let mut registry = self.inner.write();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.topics.entry(topic).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        tracing::debug!(topic = %topic, subscription = %id, "Handler subscribed");
        id
    }

    /// Register a handler that only sees decision responses
    pub fn on_decision<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DecisionResponse) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(Topic::DecisionResponse, move |event| match event {
            BusEvent::DecisionResponse(response) => handler(response),
            _ => Ok(()),
        })
    }

    /// Remove a subscription
    ///
    /// Returns false if it was not registered (already removed, cleared, or
    /// registered under another topic).
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut registry = self.inner.write();
        let Some(subs) = registry.topics.get_mut(&topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            registry.topics.remove(&topic);
        }
        if removed {
            tracing::debug!(topic = %topic, subscription = %id, "Handler unsubscribed");
        }
        removed
    }

    /// Deliver `event` to every handler of its topic
    pub fn publish(&self, event: BusEvent) -> PublishReport {
        let topic = event.topic();
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let registry = self.inner.read();
            registry
                .topics
                .get(&topic)
                .map(|subs| {
                    subs.iter()
                        .map(|sub| (sub.id, Arc::clone(&sub.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = PublishReport {
            topic,
            delivered: 0,
            failed: 0,
        };

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(topic = %topic, subscription = %id, error = %e, "Handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    tracing::error!(
                        topic = %topic,
                        subscription = %id,
                        panic = panic_message(panic.as_ref()),
                        "Handler panicked"
                    );
                }
            }
        }

        report
    }

    /// Drop every subscription
    pub fn clear(&self) {
        let mut registry = self.inner.write();
        let total: usize = registry.topics.values().map(Vec::len).sum();
        registry.topics.clear();
        tracing::debug!(removed = total, "Event bus cleared");
    }

    /// Number of handlers on `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.read().topics.get(&topic).map_or(0, Vec::len)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
