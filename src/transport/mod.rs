//! Transport abstraction over the external AMQP implementation: traits,
//! lifecycle events, and builder factory.
//!
//! The harness consumes the connection/session/link hierarchy through these
//! traits; all protocol logic (framing, negotiation, flow control) lives in
//! the adapter's underlying library.

#[cfg(feature = "transport-amqp")]
pub mod amqp;
#[cfg(any(test, feature = "transport-mock"))]
pub mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::Options;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    Amqp,
    #[cfg(any(test, feature = "transport-mock"))]
    Mock,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("open: {0}")]
    Open(String),
    #[error("publish: {0}")]
    Publish(String),
    #[error("receive: {0}")]
    Receive(String),
    #[error("timeout")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("other: {0}")]
    Other(String),
}

/// Which transport object an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Connection,
    Session,
    Link,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Connection => write!(f, "connection"),
            Entity::Session => write!(f, "session"),
            Entity::Link => write!(f, "link"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Opened,
    Closed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Opened => write!(f, "opened"),
            EventKind::Closed => write!(f, "closed"),
        }
    }
}

/// Open/close notification for a transport object. Consumed by a logging
/// sink only; nothing in the harness acts on these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub entity: Entity,
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn opened(entity: Entity) -> Self {
        Self {
            entity,
            kind: EventKind::Opened,
        }
    }

    pub fn closed(entity: Entity) -> Self {
        Self {
            entity,
            kind: EventKind::Closed,
        }
    }
}

/// An open connection to the messaging endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Create an unopened session handle multiplexed on this connection.
    fn create_session(&self) -> Arc<dyn Session>;
    /// Stream of open/close notifications for this connection's objects.
    fn lifecycle(&self) -> flume::Receiver<LifecycleEvent>;
    /// Close the connection. Idempotent.
    async fn close(&self, timeout: Duration) -> Result<(), TransportError>;
}

/// A session handle. Created unopened so the harness can open the session
/// and its link concurrently; adapters must tolerate `open` racing with a
/// link open on the same session.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    async fn open(&self, timeout: Duration) -> Result<(), TransportError>;
    /// Create an unopened sender link targeting `address`.
    fn create_sender(self: Arc<Self>, address: &str) -> Box<dyn Link>;
    /// Create an unopened receiver link sourcing from `address`.
    fn create_receiver(self: Arc<Self>, address: &str) -> Box<dyn Link>;
}

/// A unidirectional message channel nested under a session. Direction is
/// fixed at creation; the mismatched operation returns `Unsupported`.
#[async_trait::async_trait]
pub trait Link: Send + Sync {
    async fn open(&self, timeout: Duration) -> Result<(), TransportError>;
    async fn send(&self, _payload: Bytes) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("not a sender link"))
    }
    async fn receive(&self, _timeout: Duration) -> Result<Bytes, TransportError> {
        Err(TransportError::Unsupported("not a receiver link"))
    }
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct TransportBuilder;

impl TransportBuilder {
    pub async fn connect(
        engine: Engine,
        options: &Options,
    ) -> Result<Box<dyn Transport>, TransportError> {
        match engine {
            Engine::Amqp => {
                #[cfg(feature = "transport-amqp")]
                {
                    return crate::transport::amqp::connect(options).await;
                }
                #[cfg(not(feature = "transport-amqp"))]
                {
                    Err(TransportError::Connect("amqp feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "transport-mock"))]
            Engine::Mock => crate::transport::mock::connect(options).await,
        }
    }
}
