//! Room membership.
//!
//! Every operation here goes through the roster's table lock, so a room's
//! member set and each member's room set change together.

use crate::connection::UserId;
use crate::error::PresenceError;
use crate::registry::Roster;
use crate::table::RoomSnapshot;
use beacon_protocol::validate_identifier;
use tracing::debug;

impl Roster {
    /// Add a registered user to a room and subscribe it to the room topic.
    ///
    /// Returns `false` if the user was already a member (nothing changes).
    ///
    /// # Errors
    ///
    /// - [`PresenceError::NotConnected`] if the user is not registered.
    /// - [`PresenceError::InvalidIdentifier`] for a malformed room id.
    /// - [`PresenceError::RoomLimitExceeded`] if the user is in too many rooms.
    /// - [`PresenceError::Transport`] if the room subscription was refused.
    ///
    /// State is unchanged on every error.
    pub fn join(&self, user_id: &str, chat_id: &str) -> Result<bool, PresenceError> {
        validate_identifier(chat_id).map_err(PresenceError::InvalidIdentifier)?;

        let joined = {
            let mut table = self.table.write();
            let joined = table.join(user_id, chat_id, self.config.max_rooms_per_connection)?;
            debug_assert!(table.is_consistent());
            joined
        };

        if joined {
            debug!(user = %user_id, chat = %chat_id, "Joined room");
        }
        Ok(joined)
    }

    /// Remove a user from a room. Empty rooms are pruned.
    ///
    /// Returns `false` if the user was not a member; that is not an error.
    pub fn leave(&self, user_id: &str, chat_id: &str) -> bool {
        let left = {
            let mut table = self.table.write();
            let left = table.leave(user_id, chat_id);
            debug_assert!(table.is_consistent());
            left
        };

        if left {
            debug!(user = %user_id, chat = %chat_id, "Left room");
        }
        left
    }

    /// Members of a room, sorted. Empty if the room does not exist.
    #[must_use]
    pub fn list_members(&self, chat_id: &str) -> Vec<UserId> {
        self.table.read().members(chat_id).unwrap_or_default()
    }

    /// Members of a room, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::NotFound`] if the room has no members.
    pub fn members(&self, chat_id: &str) -> Result<Vec<UserId>, PresenceError> {
        self.table
            .read()
            .members(chat_id)
            .ok_or_else(|| PresenceError::NotFound(format!("room {}", chat_id)))
    }

    /// Owned copy of the whole room index.
    #[must_use]
    pub fn list_rooms(&self) -> RoomSnapshot {
        self.table.read().rooms()
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::ConnectionMeta;
    use crate::error::PresenceError;
    use crate::registry::{Roster, RosterConfig};
    use crate::testing::MockTransport;
    use std::collections::BTreeSet;

    async fn roster_with(users: &[&str]) -> Roster {
        let roster = Roster::new();
        for user in users {
            let transport = MockTransport::new(&format!("c-{}", user));
            roster
                .register(user, transport, ConnectionMeta::new(*user, "parent"))
                .await
                .unwrap();
        }
        roster
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let roster = roster_with(&["u1"]).await;

        assert!(roster.join("u1", "room1").unwrap());
        assert!(!roster.join("u1", "room1").unwrap());
        assert_eq!(roster.list_members("room1"), vec!["u1".to_string()]);
        assert_eq!(roster.rooms_of("u1").unwrap(), vec!["room1".to_string()]);
    }

    #[tokio::test]
    async fn test_join_unregistered_user_fails() {
        let roster = roster_with(&["u1"]).await;
        roster.join("u1", "room1").unwrap();

        assert!(matches!(
            roster.join("ghost", "room1"),
            Err(PresenceError::NotConnected(user)) if user == "ghost"
        ));
        assert_eq!(roster.list_members("room1"), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_join_rejects_bad_room_id() {
        let roster = roster_with(&["u1"]).await;
        assert!(matches!(
            roster.join("u1", ""),
            Err(PresenceError::InvalidIdentifier(_))
        ));
        assert!(roster.list_rooms().is_empty());
    }

    #[tokio::test]
    async fn test_room_limit_from_config() {
        let roster = Roster::with_config(RosterConfig {
            max_rooms_per_connection: 1,
            ..RosterConfig::default()
        });
        roster
            .register("u1", MockTransport::new("c1"), ConnectionMeta::new("Alice", "teacher"))
            .await
            .unwrap();

        roster.join("u1", "a").unwrap();
        assert!(matches!(
            roster.join("u1", "b"),
            Err(PresenceError::RoomLimitExceeded { .. })
        ));
        assert!(roster.list_members("b").is_empty());
    }

    #[tokio::test]
    async fn test_leave_non_member_is_noop() {
        let roster = roster_with(&["u1", "u2"]).await;
        roster.join("u2", "room1").unwrap();
        let before = roster.list_rooms();

        assert!(!roster.leave("u1", "room1"));
        assert!(!roster.leave("u1", "nowhere"));
        assert!(!roster.leave("ghost", "room1"));
        assert_eq!(roster.list_rooms(), before);
    }

    #[tokio::test]
    async fn test_last_leave_prunes_room() {
        let roster = roster_with(&["u1", "u2"]).await;
        roster.join("u1", "room1").unwrap();
        roster.join("u2", "room1").unwrap();

        assert!(roster.leave("u1", "room1"));
        assert_eq!(roster.list_members("room1"), vec!["u2".to_string()]);

        assert!(roster.leave("u2", "room1"));
        assert!(!roster.list_rooms().contains_key("room1"));
        assert!(matches!(roster.members("room1"), Err(PresenceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unregister_removes_from_all_rooms() {
        let roster = roster_with(&["u1", "u2"]).await;
        roster.join("u1", "c1").unwrap();
        roster.join("u1", "c2").unwrap();
        roster.join("u2", "c2").unwrap();

        roster.unregister("u1").unwrap();

        let rooms = roster.list_rooms();
        assert!(!rooms.contains_key("c1"));
        assert_eq!(rooms["c2"], BTreeSet::from(["u2".to_string()]));
    }

    #[tokio::test]
    async fn test_list_rooms_is_a_snapshot() {
        let roster = roster_with(&["u1", "u2"]).await;
        roster.join("u1", "room1").unwrap();

        let snapshot = roster.list_rooms();
        roster.join("u2", "room1").unwrap();
        roster.join("u2", "room2").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["room1"].len(), 1);
        assert_eq!(roster.list_rooms().len(), 2);
    }
}
