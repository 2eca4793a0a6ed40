//! Connection and presence record types.

use crate::lifecycle::{ConnectionState, Lifecycle};
use beacon_transport::{ConnectionId, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A user identifier, as issued by the authentication layer.
pub type UserId = String;

/// A room (chat) identifier.
pub type ChatId = String;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Metadata supplied by the handshake layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMeta {
    /// Display name.
    pub user_name: String,
    /// Role, e.g. `teacher` or `parent`.
    pub role: String,
}

impl ConnectionMeta {
    /// Create connection metadata.
    #[must_use]
    pub fn new(user_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            role: role.into(),
        }
    }
}

/// Presence record for one connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub user_id: UserId,
    pub user_name: String,
    pub role: String,
    /// When the connection registered, in Unix milliseconds.
    pub connected_at: u64,
    /// Rooms the user currently occupies.
    pub chat_rooms: BTreeSet<ChatId>,
}

impl ConnectionInfo {
    pub(crate) fn new(user_id: &str, meta: &ConnectionMeta, connected_at: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: meta.user_name.clone(),
            role: meta.role.clone(),
            connected_at,
            chat_rooms: BTreeSet::new(),
        }
    }
}

/// A live transport session bound to one user.
///
/// Cloning is cheap; every clone shares the transport and lifecycle.
#[derive(Clone)]
pub struct Connection {
    user_id: UserId,
    meta: ConnectionMeta,
    connected_at: u64,
    transport: Arc<dyn Transport>,
    lifecycle: Arc<Lifecycle>,
}

impl Connection {
    pub(crate) fn new(user_id: &str, transport: Arc<dyn Transport>, meta: ConnectionMeta) -> Self {
        Self {
            user_id: user_id.to_string(),
            meta,
            connected_at: now_millis(),
            transport,
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Connection identifier, unique per handshake.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        self.transport.id()
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn meta(&self) -> &ConnectionMeta {
        &self.meta
    }

    #[must_use]
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// The transport handle.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The shared lifecycle cell.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", self.id())
            .field("user_id", &self.user_id)
            .field("meta", &self.meta)
            .field("connected_at", &self.connected_at)
            .field("state", &self.state())
            .finish()
    }
}
