//! The presence table.
//!
//! Connections and room membership live in one structure so that every
//! mutation touching both sides happens in a single critical section. All
//! methods take `&mut self`; the roster owns the only lock around the table.
//!
//! Invariant: `user ∈ rooms[chat]` iff `chat ∈ entries[user].info.chat_rooms`,
//! and no room maps to an empty member set.

use crate::connection::{ChatId, Connection, ConnectionInfo, UserId};
use crate::error::PresenceError;
use beacon_protocol::Topic;
use beacon_transport::TransportError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;

/// Snapshot of the room index.
pub type RoomSnapshot = BTreeMap<ChatId, BTreeSet<UserId>>;

pub(crate) struct Entry {
    pub connection: Connection,
    pub info: ConnectionInfo,
}

#[derive(Default)]
pub(crate) struct Table {
    entries: HashMap<UserId, Entry>,
    rooms: HashMap<ChatId, HashSet<UserId>>,
    /// Users whose previous connection is being closed by a registration.
    replacing: HashSet<UserId>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn membership_count(&self) -> usize {
        self.rooms.values().map(HashSet::len).sum()
    }

    pub fn get(&self, user_id: &str) -> Option<&Entry> {
        self.entries.get(user_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn is_replacing(&self, user_id: &str) -> bool {
        self.replacing.contains(user_id)
    }

    pub fn mark_replacing(&mut self, user_id: &str) {
        self.replacing.insert(user_id.to_string());
    }

    pub fn clear_replacing(&mut self, user_id: &str) {
        self.replacing.remove(user_id);
    }

    /// Install a connection and subscribe it to its personal and global topics.
    ///
    /// On failure nothing is installed and no subscription is left behind.
    pub fn insert(
        &mut self,
        connection: Connection,
        info: ConnectionInfo,
    ) -> Result<(), TransportError> {
        let transport = connection.transport();
        let personal = Topic::user(info.user_id.as_str());

        transport.subscribe(&personal)?;
        if let Err(e) = transport.subscribe(&Topic::Global) {
            let _ = transport.unsubscribe(&personal);
            return Err(e);
        }

        self.entries
            .insert(info.user_id.clone(), Entry { connection, info });
        Ok(())
    }

    /// Remove a user, leaving every room it occupies first.
    pub fn remove(&mut self, user_id: &str) -> Option<Entry> {
        // Snapshot: `leave` mutates the set being walked.
        let rooms: Vec<ChatId> = self
            .entries
            .get(user_id)?
            .info
            .chat_rooms
            .iter()
            .cloned()
            .collect();

        for chat_id in &rooms {
            self.leave(user_id, chat_id);
        }

        let entry = self.entries.remove(user_id)?;
        let transport = entry.connection.transport();
        for topic in [Topic::user(user_id), Topic::Global] {
            if let Err(e) = transport.unsubscribe(&topic) {
                warn!(user = %user_id, topic = %topic, error = %e, "Unsubscribe failed during removal");
            }
        }
        Some(entry)
    }

    /// Remove every user.
    pub fn drain(&mut self) -> Vec<Entry> {
        let users: Vec<UserId> = self.entries.keys().cloned().collect();
        users.iter().filter_map(|u| self.remove(u)).collect()
    }

    /// Add a user to a room. Returns `false` if it was already a member.
    pub fn join(
        &mut self,
        user_id: &str,
        chat_id: &str,
        max_rooms: usize,
    ) -> Result<bool, PresenceError> {
        let entry = self
            .entries
            .get_mut(user_id)
            .ok_or_else(|| PresenceError::NotConnected(user_id.to_string()))?;

        if entry.info.chat_rooms.contains(chat_id) {
            return Ok(false);
        }
        if entry.info.chat_rooms.len() >= max_rooms {
            return Err(PresenceError::RoomLimitExceeded {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
                limit: max_rooms,
            });
        }

        entry.connection.transport().subscribe(&Topic::chat(chat_id))?;
        entry.info.chat_rooms.insert(chat_id.to_string());
        self.rooms
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        Ok(true)
    }

    /// Remove a user from a room. Returns `false` if it was not a member.
    pub fn leave(&mut self, user_id: &str, chat_id: &str) -> bool {
        let mut in_room = false;
        if let Some(members) = self.rooms.get_mut(chat_id) {
            in_room = members.remove(user_id);
            if members.is_empty() {
                self.rooms.remove(chat_id);
            }
        }

        let mut in_user = false;
        if let Some(entry) = self.entries.get_mut(user_id) {
            in_user = entry.info.chat_rooms.remove(chat_id);
            if in_user {
                let topic = Topic::chat(chat_id);
                if let Err(e) = entry.connection.transport().unsubscribe(&topic) {
                    warn!(user = %user_id, topic = %topic, error = %e, "Unsubscribe failed during leave");
                }
            }
        }

        in_room || in_user
    }

    pub fn members(&self, chat_id: &str) -> Option<Vec<UserId>> {
        self.rooms.get(chat_id).map(|members| {
            let mut users: Vec<UserId> = members.iter().cloned().collect();
            users.sort();
            users
        })
    }

    pub fn rooms(&self) -> RoomSnapshot {
        self.rooms
            .iter()
            .map(|(chat, members)| (chat.clone(), members.iter().cloned().collect()))
            .collect()
    }

    /// Check the bidirectional membership invariant.
    pub fn is_consistent(&self) -> bool {
        let forward = self.rooms.iter().all(|(chat, members)| {
            !members.is_empty()
                && members.iter().all(|user| {
                    self.entries
                        .get(user)
                        .is_some_and(|e| e.info.chat_rooms.contains(chat))
                })
        });
        let backward = self.entries.iter().all(|(user, entry)| {
            entry
                .info
                .chat_rooms
                .iter()
                .all(|chat| self.rooms.get(chat).is_some_and(|m| m.contains(user)))
        });
        forward && backward
    }
}
