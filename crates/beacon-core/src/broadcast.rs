//! Topic broadcaster.
//!
//! A [`Broadcaster`] turns an [`Envelope`] into bytes once and fans it out
//! with the [`FanoutStrategy`] chosen at construction:
//!
//! - [`TopicPublish`] hands the payload to the transport's native topic
//!   publisher. Fastest, but it cannot leave a recipient out: an `exclude`
//!   argument is ignored.
//! - [`DirectSend`] snapshots the recipients from the roster and sends to each
//!   one. Supports exclusion at O(recipients) cost.
//!
//! Delivery is best effort. A failed recipient is logged and counted, never
//! retried, and never stops delivery to the others. Connections found closed
//! or timing out are evicted on a background task.

use crate::connection::{ChatId, Connection, UserId};
use crate::error::PresenceError;
use crate::registry::Roster;
use async_trait::async_trait;
use beacon_protocol::{codec, Envelope, Format, Topic};
use beacon_transport::TopicPublisher;
use bytes::Bytes;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Which fan-out strategy a broadcaster uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// Native topic publish.
    Topic,
    /// Iterate recipients and send to each.
    #[default]
    Direct,
}

/// Broadcaster configuration.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Wire encoding for envelopes.
    pub format: Format,
    /// Upper bound for a single recipient write.
    pub write_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            format: Format::Json,
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a single-recipient send.
#[derive(Debug)]
pub enum Delivery {
    /// Handed to the transport.
    Sent,
    /// The user has no live connection; nothing was sent.
    Offline,
    /// The send failed.
    Failed(PresenceError),
}

impl Delivery {
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// What a fan-out targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutTarget {
    /// Every member of a room.
    Room(ChatId),
    /// Every connected user.
    All,
}

impl FanoutTarget {
    /// The topic carrying this target's messages.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            FanoutTarget::Room(chat_id) => Topic::chat(chat_id.as_str()),
            FanoutTarget::All => Topic::Global,
        }
    }
}

/// Summary of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    /// Strategy that performed the fan-out.
    pub strategy: &'static str,
    /// Recipients a send was attempted for.
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Recipients that went offline before their send.
    pub skipped: usize,
    /// Recipients left out by the `exclude` argument.
    pub excluded: usize,
}

/// Per-recipient delivery with bounded writes and stale-connection eviction.
pub struct Courier {
    roster: Arc<Roster>,
    write_timeout: Duration,
}

impl Courier {
    /// Create a courier over a roster.
    #[must_use]
    pub fn new(roster: Arc<Roster>, write_timeout: Duration) -> Self {
        Self {
            roster,
            write_timeout,
        }
    }

    /// The roster recipients are resolved against.
    #[must_use]
    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    /// Send to a user's live connection, if any.
    pub async fn send_to_user(&self, user_id: &str, payload: Bytes) -> Delivery {
        match self.roster.lookup(user_id) {
            Ok(connection) => self.deliver(&connection, payload).await,
            Err(_) => {
                trace!(user = %user_id, "Send to offline user skipped");
                Delivery::Offline
            }
        }
    }

    /// Send to a specific connection.
    pub async fn deliver(&self, connection: &Connection, payload: Bytes) -> Delivery {
        let transport = connection.transport();
        let user_id = connection.user_id();

        if !transport.is_ready() {
            debug!(user = %user_id, connection = %connection.id(), "Transport not ready");
            self.schedule_eviction(connection);
            return Delivery::Failed(send_failure(user_id, "transport not ready"));
        }

        match tokio::time::timeout(self.write_timeout, transport.send(payload)).await {
            Ok(Ok(())) => Delivery::Sent,
            Ok(Err(e)) => {
                warn!(user = %user_id, connection = %connection.id(), error = %e, "Send failed");
                if e.is_stale() {
                    self.schedule_eviction(connection);
                }
                Delivery::Failed(send_failure(user_id, e.to_string()))
            }
            Err(_) => {
                warn!(
                    user = %user_id,
                    connection = %connection.id(),
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Send timed out"
                );
                self.schedule_eviction(connection);
                Delivery::Failed(send_failure(user_id, "write timed out"))
            }
        }
    }

    fn schedule_eviction(&self, connection: &Connection) {
        let roster = Arc::clone(&self.roster);
        let user_id = connection.user_id().to_string();
        let connection_id = connection.id().clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    roster.evict(&user_id, &connection_id).await;
                });
            }
            Err(_) => {
                roster.unregister_connection(&user_id, &connection_id);
            }
        }
    }
}

fn send_failure(user_id: &str, reason: impl Into<String>) -> PresenceError {
    PresenceError::TransportSendFailure {
        user_id: user_id.to_string(),
        reason: reason.into(),
    }
}

/// A way of delivering one payload to a room or to everyone.
#[async_trait]
pub trait FanoutStrategy: Send + Sync {
    /// Strategy name, for logs and reports.
    fn name(&self) -> &'static str;

    /// Deliver `payload` to `target`, leaving out `exclude` where supported.
    async fn fan_out(
        &self,
        courier: &Courier,
        target: &FanoutTarget,
        payload: Bytes,
        exclude: Option<&str>,
    ) -> FanoutReport;
}

/// Fan-out through the transport's native topic publish.
pub struct TopicPublish {
    publisher: Arc<dyn TopicPublisher>,
}

impl TopicPublish {
    #[must_use]
    pub fn new(publisher: Arc<dyn TopicPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl FanoutStrategy for TopicPublish {
    fn name(&self) -> &'static str {
        "topic"
    }

    async fn fan_out(
        &self,
        _courier: &Courier,
        target: &FanoutTarget,
        payload: Bytes,
        exclude: Option<&str>,
    ) -> FanoutReport {
        let topic = target.topic();
        if let Some(user_id) = exclude {
            debug!(topic = %topic, user = %user_id, "Topic publish cannot exclude a recipient");
        }

        let reached = self.publisher.publish(&topic, payload);
        FanoutReport {
            strategy: self.name(),
            recipients: reached,
            delivered: reached,
            ..FanoutReport::default()
        }
    }
}

/// Fan-out by iterating recipients and sending to each.
pub struct DirectSend;

#[async_trait]
impl FanoutStrategy for DirectSend {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fan_out(
        &self,
        courier: &Courier,
        target: &FanoutTarget,
        payload: Bytes,
        exclude: Option<&str>,
    ) -> FanoutReport {
        let members: Vec<UserId> = match target {
            FanoutTarget::Room(chat_id) => courier.roster().list_members(chat_id),
            FanoutTarget::All => courier.roster().user_ids(),
        };
        let total = members.len();
        let recipients: Vec<UserId> = members
            .into_iter()
            .filter(|user_id| Some(user_id.as_str()) != exclude)
            .collect();

        let outcomes = join_all(
            recipients
                .iter()
                .map(|user_id| courier.send_to_user(user_id, payload.clone())),
        )
        .await;

        let mut report = FanoutReport {
            strategy: self.name(),
            recipients: recipients.len(),
            excluded: total - recipients.len(),
            ..FanoutReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Delivery::Sent => report.delivered += 1,
                Delivery::Offline => report.skipped += 1,
                Delivery::Failed(_) => report.failed += 1,
            }
        }
        report
    }
}

/// Resolves targets and fans messages out over the roster.
pub struct Broadcaster {
    courier: Courier,
    strategy: Box<dyn FanoutStrategy>,
    format: Format,
}

impl Broadcaster {
    /// Create a broadcaster with an explicit strategy.
    #[must_use]
    pub fn new(
        roster: Arc<Roster>,
        strategy: Box<dyn FanoutStrategy>,
        config: BroadcastConfig,
    ) -> Self {
        debug!(strategy = strategy.name(), "Creating broadcaster");
        Self {
            courier: Courier::new(roster, config.write_timeout),
            strategy,
            format: config.format,
        }
    }

    /// Broadcaster that iterates recipients.
    #[must_use]
    pub fn direct(roster: Arc<Roster>, config: BroadcastConfig) -> Self {
        Self::new(roster, Box::new(DirectSend), config)
    }

    /// Broadcaster that publishes to topics.
    #[must_use]
    pub fn topic(
        roster: Arc<Roster>,
        publisher: Arc<dyn TopicPublisher>,
        config: BroadcastConfig,
    ) -> Self {
        Self::new(roster, Box::new(TopicPublish::new(publisher)), config)
    }

    /// Name of the configured strategy.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        self.strategy.name()
    }

    #[must_use]
    pub fn roster(&self) -> &Arc<Roster> {
        self.courier.roster()
    }

    /// Encode an envelope in the configured wire format.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Encode`] if the envelope cannot be encoded.
    pub fn encode(&self, envelope: &Envelope) -> Result<Bytes, PresenceError> {
        Ok(codec::encode_envelope(envelope, self.format)?)
    }

    /// Send an envelope to one user. Offline users are skipped silently.
    pub async fn send_to_user(&self, user_id: &str, envelope: &Envelope) -> Delivery {
        match self.encode(envelope) {
            Ok(payload) => self.courier.send_to_user(user_id, payload).await,
            Err(e) => Delivery::Failed(e),
        }
    }

    /// Send an envelope to every member of a room.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Encode`] if the envelope cannot be encoded.
    /// Recipient failures are reported in the [`FanoutReport`], not here.
    pub async fn broadcast_to_room(
        &self,
        chat_id: &str,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> Result<FanoutReport, PresenceError> {
        self.fan_out(FanoutTarget::Room(chat_id.to_string()), envelope, exclude)
            .await
    }

    /// Send an envelope to every connected user.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Encode`] if the envelope cannot be encoded.
    pub async fn broadcast_to_all(
        &self,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> Result<FanoutReport, PresenceError> {
        self.fan_out(FanoutTarget::All, envelope, exclude).await
    }

    async fn fan_out(
        &self,
        target: FanoutTarget,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> Result<FanoutReport, PresenceError> {
        let payload = self.encode(envelope)?;
        let report = self
            .strategy
            .fan_out(&self.courier, &target, payload, exclude)
            .await;

        debug!(
            target = ?target,
            kind = %envelope.kind,
            strategy = report.strategy,
            delivered = report.delivered,
            failed = report.failed,
            "Fan-out complete"
        );
        Ok(report)
    }
}
