//! Presence errors.

use crate::connection::{ChatId, UserId};
use crate::lifecycle::ConnectionState;
use beacon_protocol::ProtocolError;
use beacon_transport::TransportError;
use thiserror::Error;

/// Errors returned by the presence core.
///
/// Redundant joins, leaves and unregisters are successful no-ops and never
/// surface here.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The user has no live connection.
    #[error("User not connected: {0}")]
    NotConnected(UserId),

    /// Lookup against an unknown user or room.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A replacement of the user's previous connection is in flight or failed.
    #[error("Registration already in progress for user: {0}")]
    AlreadyRegistering(UserId),

    /// Delivery to a single recipient failed.
    #[error("Send to {user_id} failed: {reason}")]
    TransportSendFailure { user_id: UserId, reason: String },

    /// A user or room identifier failed validation.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(&'static str),

    /// The user already occupies the maximum number of rooms.
    #[error("User {user_id} cannot join {chat_id}: room limit {limit} reached")]
    RoomLimitExceeded {
        user_id: UserId,
        chat_id: ChatId,
        limit: usize,
    },

    /// A connection lifecycle transition that the state machine forbids.
    #[error("Invalid connection transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The transport rejected a subscription change.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The message could not be serialized.
    #[error("Encoding error: {0}")]
    Encode(#[from] ProtocolError),
}
