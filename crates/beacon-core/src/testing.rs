//! Recording transport for unit tests.

use async_trait::async_trait;
use beacon_protocol::Topic;
use beacon_transport::{ConnectionId, Transport, TransportError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct MockTransport {
    id: ConnectionId,
    sent: Mutex<Vec<Bytes>>,
    topics: Mutex<BTreeSet<String>>,
    closed: AtomicBool,
    pub fail_sends: AtomicBool,
    pub stall_sends: AtomicBool,
    pub stall_close: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub close_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            sent: Mutex::new(Vec::new()),
            topics: Mutex::new(BTreeSet::new()),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            stall_sends: AtomicBool::new(false),
            stall_close: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }

    pub fn topics(&self) -> BTreeSet<String> {
        self.topics.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("broken pipe".into()));
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Other("subscribe refused".into()));
        }
        self.topics.lock().insert(topic.name());
        Ok(())
    }

    fn unsubscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        self.topics.lock().remove(&topic.name());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}
