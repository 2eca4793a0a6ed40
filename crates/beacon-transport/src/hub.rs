//! In-process topic hub.
//!
//! The hub is the transport-level pub/sub that [`HubSession`](crate::HubSession)
//! connections subscribe through. Each topic owns a tokio broadcast channel;
//! publishing hands the payload to every receiver without copying it.

use crate::traits::{ConnectionId, TopicPublisher};
use beacon_protocol::Topic;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Broadcast buffer per topic.
    pub topic_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            topic_capacity: 1024,
        }
    }
}

struct TopicEntry {
    sender: broadcast::Sender<Bytes>,
    subscribers: HashSet<ConnectionId>,
}

impl TopicEntry {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: HashSet::new(),
        }
    }
}

/// Topic pub/sub shared by all hub-backed sessions.
pub struct TopicHub {
    /// Topics indexed by rendered name.
    topics: DashMap<String, TopicEntry>,
    /// Connection subscriptions (connection -> topic names).
    subscriptions: DashMap<ConnectionId, DashSet<String>>,
    config: HubConfig,
}

impl TopicHub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating topic hub with config: {:?}", config);
        Self {
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    /// Subscribe a connection to a topic.
    ///
    /// Subscribing twice hands out a second receiver for the same topic; callers
    /// that want idempotence track their own receivers.
    pub fn subscribe(
        &self,
        connection_id: &ConnectionId,
        topic: &Topic,
    ) -> broadcast::Receiver<Bytes> {
        let name = topic.name();

        let receiver = {
            let mut entry = self.topics.entry(name.clone()).or_insert_with(|| {
                debug!(topic = %name, "Creating new topic");
                TopicEntry::new(self.config.topic_capacity)
            });
            entry.subscribers.insert(connection_id.clone());
            entry.sender.subscribe()
        };

        self.subscriptions
            .entry(connection_id.clone())
            .or_default()
            .insert(name.clone());

        debug!(topic = %name, connection = %connection_id, "Subscribed");
        receiver
    }

    /// Unsubscribe a connection from a topic.
    ///
    /// Returns `true` if the connection was subscribed. Empty topics are dropped.
    pub fn unsubscribe(&self, connection_id: &ConnectionId, topic: &Topic) -> bool {
        let name = topic.name();

        let removed = self
            .subscriptions
            .get(connection_id)
            .map(|subs| subs.remove(&name).is_some())
            .unwrap_or(false);
        self.subscriptions
            .remove_if(connection_id, |_, subs| subs.is_empty());

        self.detach(connection_id, &name);

        if removed {
            debug!(topic = %name, connection = %connection_id, "Unsubscribed");
        }
        removed
    }

    /// Unsubscribe a connection from every topic.
    pub fn unsubscribe_all(&self, connection_id: &ConnectionId) {
        if let Some((_, names)) = self.subscriptions.remove(connection_id) {
            for name in names.iter() {
                self.detach(connection_id, name.as_str());
            }
            debug!(connection = %connection_id, "Unsubscribed from all topics");
        }
    }

    fn detach(&self, connection_id: &ConnectionId, name: &str) {
        if let Some(mut entry) = self.topics.get_mut(name) {
            entry.subscribers.remove(connection_id);
            if entry.subscribers.is_empty() {
                drop(entry);
                self.topics.remove_if(name, |_, e| e.subscribers.is_empty());
                trace!(topic = %name, "Deleted empty topic");
            }
        }
    }

    /// Check if a topic has subscribers.
    #[must_use]
    pub fn topic_exists(&self, topic: &Topic) -> bool {
        self.topics.contains_key(&topic.name())
    }

    /// Get the subscriber count for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(&topic.name())
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            topic_count: self.topics.len(),
            connection_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicPublisher for TopicHub {
    fn publish(&self, topic: &Topic, payload: Bytes) -> usize {
        let name = topic.name();
        match self.topics.get(&name) {
            Some(entry) => {
                let count = entry.sender.send(payload).unwrap_or_default();
                trace!(topic = %name, recipients = count, "Published");
                count
            }
            None => {
                trace!(topic = %name, "Publish to topic without subscribers");
                0
            }
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of topics with at least one subscriber.
    pub topic_count: usize,
    /// Number of subscribed connections.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}
