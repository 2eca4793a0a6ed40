//! Transport abstraction traits for Beacon.
//!
//! The presence core never touches sockets. It holds a [`Transport`] handle
//! per connection and, optionally, a [`TopicPublisher`] for native topic
//! fan-out.

use async_trait::async_trait;
use beacon_protocol::Topic;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A write did not complete in time.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The outbound queue is full.
    #[error("Outbound queue full")]
    Backpressure,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] beacon_protocol::ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the error means the connection can no longer be written to.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionClosed | TransportError::Timeout
        )
    }
}

/// A send-capable handle to one live client session.
///
/// Subscription changes are synchronous and must not block: the presence core
/// applies them while it holds its state lock. `send` and `close` are async
/// and are always awaited outside that lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Send an encoded payload to the client.
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Start receiving messages published to `topic`. Idempotent.
    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError>;

    /// Stop receiving messages published to `topic`. Idempotent.
    fn unsubscribe(&self, topic: &Topic) -> Result<(), TransportError>;

    /// Whether the connection can currently accept writes.
    fn is_ready(&self) -> bool;
}

/// Native topic publishing, as offered by the transport layer.
///
/// Publishing reaches every subscriber of the topic; there is no way to leave
/// out an individual recipient.
pub trait TopicPublisher: Send + Sync {
    /// Publish an encoded payload. Returns the number of subscribers reached.
    fn publish(&self, topic: &Topic, payload: Bytes) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_stale_errors() {
        assert!(TransportError::ConnectionClosed.is_stale());
        assert!(TransportError::Timeout.is_stale());
        assert!(!TransportError::Backpressure.is_stale());
    }
}
