//! Read-only presence views.
//!
//! Every query takes the read lock and returns owned data, so callers never
//! observe a mutation in progress and never hold the lock themselves.

use crate::connection::{ChatId, ConnectionInfo, UserId};
use crate::error::PresenceError;
use crate::registry::Roster;
use serde::Serialize;

/// Roster statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    /// Registered connections.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Sum of all room member counts.
    pub memberships: usize,
}

impl Roster {
    /// Whether the user has a live connection.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.table.read().get(user_id).is_some()
    }

    /// Users currently in a room.
    #[must_use]
    pub fn online_in_room(&self, chat_id: &str) -> Vec<UserId> {
        self.list_members(chat_id)
    }

    /// Presence records for every connected user, ordered by user id.
    #[must_use]
    pub fn all_connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .table
            .read()
            .entries()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        infos
    }

    /// Presence record for one user.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::NotConnected`] if the user is offline.
    pub fn connection_info(&self, user_id: &str) -> Result<ConnectionInfo, PresenceError> {
        self.table
            .read()
            .get(user_id)
            .map(|e| e.info.clone())
            .ok_or_else(|| PresenceError::NotConnected(user_id.to_string()))
    }

    /// Rooms a user occupies, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::NotConnected`] if the user is offline.
    pub fn rooms_of(&self, user_id: &str) -> Result<Vec<ChatId>, PresenceError> {
        self.connection_info(user_id)
            .map(|info| info.chat_rooms.into_iter().collect())
    }

    /// Ids of every connected user.
    #[must_use]
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .table
            .read()
            .entries()
            .map(|e| e.info.user_id.clone())
            .collect();
        users.sort();
        users
    }

    /// Get roster statistics.
    #[must_use]
    pub fn stats(&self) -> RosterStats {
        let table = self.table.read();
        RosterStats {
            connections: table.len(),
            rooms: table.room_count(),
            memberships: table.membership_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionMeta;
    use crate::testing::MockTransport;

    #[tokio::test]
    async fn test_presence_views() {
        let roster = Roster::new();
        roster
            .register("u2", MockTransport::new("c2"), ConnectionMeta::new("Bob", "parent"))
            .await
            .unwrap();
        roster
            .register("u1", MockTransport::new("c1"), ConnectionMeta::new("Alice", "teacher"))
            .await
            .unwrap();
        roster.join("u1", "room1").unwrap();
        roster.join("u2", "room1").unwrap();
        roster.join("u2", "room2").unwrap();

        assert!(roster.is_online("u1"));
        assert!(!roster.is_online("u3"));
        assert_eq!(roster.online_in_room("room1"), vec!["u1", "u2"]);
        assert!(roster.online_in_room("room9").is_empty());

        let all = roster.all_connections();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_name, "Alice");
        assert_eq!(all[0].role, "teacher");
        assert_eq!(all[1].chat_rooms.len(), 2);

        assert_eq!(roster.user_ids(), vec!["u1", "u2"]);
        assert_eq!(roster.rooms_of("u2").unwrap(), vec!["room1", "room2"]);
        assert!(matches!(roster.rooms_of("u3"), Err(PresenceError::NotConnected(_))));

        assert_eq!(
            roster.stats(),
            RosterStats {
                connections: 2,
                rooms: 2,
                memberships: 3
            }
        );
    }
}
