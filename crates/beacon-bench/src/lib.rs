//! Shared fixtures for Beacon benchmarks.

use async_trait::async_trait;
use beacon_core::{ConnectionMeta, Roster};
use beacon_protocol::Topic;
use beacon_transport::{ConnectionId, Transport, TransportError};
use bytes::Bytes;
use std::sync::Arc;

/// Transport that accepts and discards everything.
pub struct NullTransport {
    id: ConnectionId,
}

impl NullTransport {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
        })
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send(&self, _payload: Bytes) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn subscribe(&self, _topic: &Topic) -> Result<(), TransportError> {
        Ok(())
    }

    fn unsubscribe(&self, _topic: &Topic) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// A roster with `users` connections, all joined to `chat_id`.
pub async fn populated_roster(users: usize, chat_id: &str) -> Arc<Roster> {
    let roster = Arc::new(Roster::new());
    for i in 0..users {
        let user_id = format!("user-{}", i);
        let transport = NullTransport::new(format!("conn-{}", i));
        if roster
            .register(&user_id, transport, ConnectionMeta::new(user_id.as_str(), "member"))
            .await
            .is_ok()
        {
            let _ = roster.join(&user_id, chat_id);
        }
    }
    roster
}
