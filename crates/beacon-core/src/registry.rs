//! Connection registry.
//!
//! The [`Roster`] is the single owner of presence state: which users are
//! connected, through which transport, and which rooms they occupy. Room
//! membership ([`rooms`](crate::rooms)) and presence queries
//! ([`query`](crate::query)) are further `impl Roster` blocks over the same
//! table and lock.

use crate::connection::{Connection, ConnectionInfo, ConnectionMeta};
use crate::error::PresenceError;
use crate::lifecycle::ConnectionState;
use crate::table::{Entry, Table};
use beacon_protocol::validate_identifier;
use beacon_transport::{ConnectionId, Transport};
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Roster configuration.
#[derive(Debug, Clone)]
pub struct RosterConfig {
    /// Maximum rooms a single connection may occupy.
    pub max_rooms_per_connection: usize,
    /// Upper bound for closing a transport.
    pub close_timeout: Duration,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            max_rooms_per_connection: 100,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Presence registry and room index behind one lock.
///
/// The lock is a synchronous `RwLock` and is never held across an `.await`:
/// transport sends and closes always happen after it is released.
pub struct Roster {
    pub(crate) table: RwLock<Table>,
    pub(crate) config: RosterConfig,
}

impl Roster {
    /// Create a new roster with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RosterConfig::default())
    }

    /// Create a new roster with custom configuration.
    #[must_use]
    pub fn with_config(config: RosterConfig) -> Self {
        info!("Creating roster with config: {:?}", config);
        Self {
            table: RwLock::new(Table::default()),
            config,
        }
    }

    /// Roster configuration.
    #[must_use]
    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    /// Register a connection for `user_id`.
    ///
    /// A connection already registered for the same user is removed from all
    /// rooms and topics and closed before the new one is installed.
    ///
    /// # Errors
    ///
    /// - [`PresenceError::InvalidIdentifier`] for a malformed user id.
    /// - [`PresenceError::AlreadyRegistering`] if another registration is
    ///   replacing this user's connection, or the old transport failed to close.
    /// - [`PresenceError::Transport`] if the new transport refused its
    ///   personal or global subscription.
    pub async fn register(
        &self,
        user_id: &str,
        transport: Arc<dyn Transport>,
        meta: ConnectionMeta,
    ) -> Result<Connection, PresenceError> {
        validate_identifier(user_id).map_err(PresenceError::InvalidIdentifier)?;

        let mut pending = {
            let mut table = self.table.write();
            if table.is_replacing(user_id) {
                return Err(PresenceError::AlreadyRegistering(user_id.to_string()));
            }
            table.remove(user_id).map(|old| {
                table.mark_replacing(user_id);
                Replacement {
                    table: &self.table,
                    user_id,
                    old,
                    armed: true,
                }
            })
        };

        if let Some(replacement) = &pending {
            let old = &replacement.old;
            info!(
                user = %user_id,
                old = %old.connection.id(),
                new = %transport.id(),
                "Replacing existing connection"
            );
            if !self.close_entry(old).await {
                return Err(PresenceError::AlreadyRegistering(user_id.to_string()));
            }
        }

        let connection = Connection::new(user_id, transport, meta);
        let info = ConnectionInfo::new(user_id, connection.meta(), connection.connected_at());

        let (raced, installed) = {
            let mut table = self.table.write();
            table.clear_replacing(user_id);
            if let Some(replacement) = pending.as_mut() {
                replacement.armed = false;
            }
            // A concurrent registration may have slipped in while we were closing.
            let raced = table.remove(user_id);
            let installed = table
                .insert(connection.clone(), info)
                .map_err(PresenceError::from)
                .and_then(|()| connection.lifecycle().advance(ConnectionState::Open));
            debug_assert!(table.is_consistent());
            (raced, installed)
        };
        drop(pending);

        if let Some(raced) = raced {
            warn!(user = %user_id, old = %raced.connection.id(), "Concurrent registration replaced");
            self.close_entry(&raced).await;
            Self::finish(raced);
        }
        installed?;

        debug!(user = %user_id, connection = %connection.id(), "Registered");
        Ok(connection)
    }

    /// Unregister a user, cascading out of every room.
    ///
    /// Idempotent: returns `None` if the user was not registered.
    pub fn unregister(&self, user_id: &str) -> Option<ConnectionInfo> {
        let entry = self.table.write().remove(user_id)?;
        Some(Self::finish(entry))
    }

    /// Unregister a user only if `connection_id` is still its live connection.
    ///
    /// Used by disconnect paths so that a connection which was already
    /// replaced can never evict its successor.
    pub fn unregister_connection(
        &self,
        user_id: &str,
        connection_id: &ConnectionId,
    ) -> Option<ConnectionInfo> {
        let entry = {
            let mut table = self.table.write();
            let current = table.get(user_id)?;
            if current.connection.id() != connection_id {
                debug!(
                    user = %user_id,
                    connection = %connection_id,
                    "Skipping unregister of replaced connection"
                );
                return None;
            }
            table.remove(user_id)?
        };
        Some(Self::finish(entry))
    }

    /// Unregister a stale connection and close its transport.
    pub async fn evict(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        let entry = {
            let mut table = self.table.write();
            let is_current = table
                .get(user_id)
                .is_some_and(|current| current.connection.id() == connection_id);
            if is_current {
                table.remove(user_id)
            } else {
                None
            }
        };

        match entry {
            Some(entry) => {
                warn!(user = %user_id, connection = %connection_id, "Evicting stale connection");
                self.close_entry(&entry).await;
                Self::finish(entry);
                true
            }
            None => false,
        }
    }

    /// Look up the live connection for a user.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::NotFound`] if the user is not registered.
    pub fn lookup(&self, user_id: &str) -> Result<Connection, PresenceError> {
        self.table
            .read()
            .get(user_id)
            .map(|e| e.connection.clone())
            .ok_or_else(|| PresenceError::NotFound(format!("user {}", user_id)))
    }

    /// Number of registered connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.table.read().len()
    }

    /// Unregister everyone and close every transport.
    pub async fn shutdown(&self) {
        let entries = self.table.write().drain();
        info!(connections = entries.len(), "Shutting down roster");

        join_all(entries.iter().map(|entry| self.close_entry(entry))).await;
        for entry in entries {
            Self::finish(entry);
        }
    }

    /// Close a removed entry's transport within the close timeout.
    async fn close_entry(&self, entry: &Entry) -> bool {
        let connection = &entry.connection;
        connection.lifecycle().begin_close();

        let close = connection.transport().close();
        match tokio::time::timeout(self.config.close_timeout, close).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    user = %connection.user_id(),
                    connection = %connection.id(),
                    error = %e,
                    "Transport close failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    user = %connection.user_id(),
                    connection = %connection.id(),
                    "Transport close timed out"
                );
                false
            }
        }
    }

    fn finish(entry: Entry) -> ConnectionInfo {
        entry.connection.lifecycle().finish();
        debug!(user = %entry.info.user_id, connection = %entry.connection.id(), "Unregistered");
        entry.info
    }
}

/// An old connection being closed on behalf of a new registration.
///
/// Dropping it finishes the old lifecycle and, unless the new connection was
/// installed, releases the user's replacing mark. This also runs when the
/// registering future is cancelled mid-close.
struct Replacement<'a> {
    table: &'a RwLock<Table>,
    user_id: &'a str,
    old: Entry,
    armed: bool,
}

impl Drop for Replacement<'_> {
    fn drop(&mut self) {
        self.old.connection.lifecycle().finish();
        debug!(user = %self.user_id, connection = %self.old.connection.id(), "Unregistered");
        if self.armed {
            self.table.write().clear_replacing(self.user_id);
        }
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}
