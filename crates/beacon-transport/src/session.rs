//! Hub-backed session transport.
//!
//! A [`HubSession`] is the handle the server hands to the presence core for
//! each WebSocket. Direct sends and topic messages both land in one bounded
//! outbound queue; the socket writer drains it with [`Outbound`] items.

use crate::hub::TopicHub;
use crate::traits::{ConnectionId, Transport, TransportError};
use async_trait::async_trait;
use beacon_protocol::Topic;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Items drained by the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded payload to write.
    Payload(Bytes),
    /// The session was closed; the writer should send a close frame and stop.
    Close,
}

/// A transport whose topic subscriptions go through a [`TopicHub`].
pub struct HubSession {
    id: ConnectionId,
    hub: Arc<TopicHub>,
    outbound: mpsc::Sender<Outbound>,
    /// One forwarding task per subscribed topic.
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
    open: AtomicBool,
}

impl HubSession {
    /// Create a session and the receiving half of its outbound queue.
    #[must_use]
    pub fn new(hub: Arc<TopicHub>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Self {
            id: ConnectionId::generate(),
            hub,
            outbound,
            forwarders: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
        });
        (session, receiver)
    }

    fn spawn_forwarder(
        &self,
        topic: String,
        mut rx: broadcast::Receiver<Bytes>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Other(format!("No runtime for forwarder: {}", e)))?;
        let tx = self.outbound.clone();
        let connection = self.id.clone();

        Ok(runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if tx.send(Outbound::Payload(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(connection = %connection, topic = %topic, skipped, "Topic receiver lagged");
                    }
                }
            }
        }))
    }

    fn teardown(&self) {
        for (_, handle) in self.forwarders.lock().drain() {
            handle.abort();
        }
        self.hub.unsubscribe_all(&self.id);
    }
}

#[async_trait]
impl Transport for HubSession {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Payload(payload))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.teardown();
        // The writer may already be gone; that is a closed session too.
        let _ = self.outbound.send(Outbound::Close).await;
        debug!(connection = %self.id, "Session closed");
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let name = topic.name();
        let mut forwarders = self.forwarders.lock();
        if forwarders.contains_key(&name) {
            return Ok(());
        }

        let rx = self.hub.subscribe(&self.id, topic);
        match self.spawn_forwarder(name.clone(), rx) {
            Ok(handle) => {
                forwarders.insert(name, handle);
                Ok(())
            }
            Err(e) => {
                self.hub.unsubscribe(&self.id, topic);
                Err(e)
            }
        }
    }

    fn unsubscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        if let Some(handle) = self.forwarders.lock().remove(&topic.name()) {
            handle.abort();
        }
        self.hub.unsubscribe(&self.id, topic);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }
}

impl Drop for HubSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TopicPublisher;

    #[tokio::test]
    async fn test_session_direct_send() {
        let hub = Arc::new(TopicHub::new());
        let (session, mut rx) = HubSession::new(hub, 8);

        session.send(Bytes::from_static(b"hi")).await.unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Payload(Bytes::from_static(b"hi"))));
    }

    #[tokio::test]
    async fn test_session_receives_topic_messages() {
        let hub = Arc::new(TopicHub::new());
        let (session, mut rx) = HubSession::new(hub.clone(), 8);

        let topic = Topic::chat("room1");
        session.subscribe(&topic).unwrap();
        session.subscribe(&topic).unwrap();
        assert_eq!(hub.subscriber_count(&topic), 1);

        assert_eq!(hub.publish(&topic, Bytes::from_static(b"news")), 1);
        assert_eq!(rx.recv().await, Some(Outbound::Payload(Bytes::from_static(b"news"))));

        session.unsubscribe(&topic).unwrap();
        assert!(!hub.topic_exists(&topic));
        assert_eq!(hub.publish(&topic, Bytes::from_static(b"late")), 0);
    }

    #[tokio::test]
    async fn test_session_close() {
        let hub = Arc::new(TopicHub::new());
        let (session, mut rx) = HubSession::new(hub.clone(), 8);
        session.subscribe(&Topic::Global).unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(!session.is_ready());
        assert!(!hub.topic_exists(&Topic::Global));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(matches!(
            session.send(Bytes::new()).await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(session.subscribe(&Topic::Global).is_err());
    }

    #[tokio::test]
    async fn test_session_not_ready_after_writer_drops() {
        let hub = Arc::new(TopicHub::new());
        let (session, rx) = HubSession::new(hub, 8);
        drop(rx);

        assert!(!session.is_ready());
        assert!(session.send(Bytes::new()).await.is_err());
    }
}
