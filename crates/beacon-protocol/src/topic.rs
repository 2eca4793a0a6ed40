//! Topic naming.
//!
//! Topics are never stored; they are derived from user and room identifiers
//! whenever a transport subscribes or a publisher fans out. The rendered names
//! are shared with any transport-level pub/sub, so they must stay stable:
//!
//! - personal: `user:<user_id>`
//! - room: `chat:<chat_id>`
//! - global: `global`

use std::fmt;

/// Prefix for personal topics.
pub const USER_PREFIX: &str = "user:";

/// Prefix for room topics.
pub const CHAT_PREFIX: &str = "chat:";

/// The reserved global topic name.
pub const GLOBAL_TOPIC: &str = "global";

/// Maximum identifier length, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// A logical broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages for a single user.
    User(String),
    /// Messages for every member of a room.
    Chat(String),
    /// Messages for every connected user.
    Global,
}

impl Topic {
    /// Personal topic for a user.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Topic::User(user_id.into())
    }

    /// Room topic for a chat.
    #[must_use]
    pub fn chat(chat_id: impl Into<String>) -> Self {
        Topic::Chat(chat_id.into())
    }

    /// Render the topic name.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }

}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::User(id) => write!(f, "{USER_PREFIX}{id}"),
            Topic::Chat(id) => write!(f, "{CHAT_PREFIX}{id}"),
            Topic::Global => f.write_str(GLOBAL_TOPIC),
        }
    }
}

/// Validate a user or room identifier.
///
/// # Errors
///
/// Returns an error message if the identifier is empty, too long, or contains
/// control characters.
pub fn validate_identifier(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Identifier cannot be empty");
    }
    if id.len() > MAX_IDENTIFIER_LENGTH {
        return Err("Identifier too long");
    }
    if id.chars().any(char::is_control) {
        return Err("Identifier contains control characters");
    }
    Ok(())
}
