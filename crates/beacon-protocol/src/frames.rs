//! Frame types for the Beacon protocol.
//!
//! Client frames carry room commands and keepalives; server frames carry
//! acknowledgements, errors, and the application envelopes produced by
//! feature code. Frames are internally tagged with an `op` field so that the
//! envelope's own `type` discriminator stays untouched on the wire.

use serde::{Deserialize, Serialize};

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// The frame could not be decoded.
    pub const MALFORMED_FRAME: u16 = 1001;
    /// The sender has no live registration.
    pub const NOT_CONNECTED: u16 = 1002;
    /// An identifier failed validation.
    pub const INVALID_IDENTIFIER: u16 = 1003;
    /// The connection occupies too many rooms.
    pub const ROOM_LIMIT: u16 = 1004;
    /// The frame is not accepted from clients.
    pub const UNEXPECTED_FRAME: u16 = 1005;
    /// Anything else.
    pub const INTERNAL: u16 = 1500;
}

/// Frame kind, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Join,
    Leave,
    Ping,
    Pong,
    Ack,
    Error,
    Connected,
    Event,
}

impl FrameType {
    /// Label for this frame kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Join => "join",
            FrameType::Leave => "leave",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
            FrameType::Ack => "ack",
            FrameType::Error => "error",
            FrameType::Connected => "connected",
            FrameType::Event => "event",
        }
    }
}

/// An application message produced by feature code.
///
/// The core serializes envelopes but never looks inside `body`; its schema
/// belongs to whichever feature emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message-type discriminator, e.g. `"chat"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Frame {
    /// Join a room.
    #[serde(rename = "join")]
    Join {
        /// Request ID for acknowledgment.
        id: u64,
        /// Room to join.
        chat_id: String,
    },

    /// Leave a room.
    #[serde(rename = "leave")]
    Leave {
        /// Request ID for acknowledgment.
        id: u64,
        /// Room to leave.
        chat_id: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Acknowledgment of a request.
    #[serde(rename = "ack")]
    Ack { id: u64 },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        code: u16,
        message: String,
    },

    /// Sent once, after the session is registered and before any other frame.
    #[serde(rename = "connected")]
    Connected {
        connection_id: String,
        user_id: String,
        /// Protocol version spoken by the server.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Application envelope delivered to the client.
    #[serde(rename = "event")]
    Event {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        body: serde_json::Value,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Join { .. } => FrameType::Join,
            Frame::Leave { .. } => FrameType::Leave,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Event { .. } => FrameType::Event,
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(id: u64, chat_id: impl Into<String>) -> Self {
        Frame::Join {
            id,
            chat_id: chat_id.into(),
        }
    }

    /// Create a new Leave frame.
    #[must_use]
    pub fn leave(id: u64, chat_id: impl Into<String>) -> Self {
        Frame::Leave {
            id,
            chat_id: chat_id.into(),
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(
        connection_id: impl Into<String>,
        user_id: impl Into<String>,
        version: u8,
        heartbeat: u32,
    ) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            user_id: user_id.into(),
            version,
            heartbeat,
        }
    }

}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        Frame::Event {
            kind: envelope.kind,
            body: envelope.body,
        }
    }
}
