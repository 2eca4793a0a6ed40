//! # beacon-protocol
//!
//! Wire protocol definitions for the Beacon presence engine.
//!
//! - [`Topic`] - personal, room and global topic naming
//! - [`Envelope`] - application messages (`type` + `body`) emitted by feature code
//! - [`Frame`] - client commands and server replies
//! - [`codec`] - JSON and length-prefixed MessagePack encodings
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, Envelope, Format, Topic};
//!
//! let envelope = Envelope::new("chat", serde_json::json!({"text": "hi"}));
//! let bytes = codec::encode_envelope(&envelope, Format::Json).unwrap();
//!
//! assert_eq!(Topic::chat("room1").to_string(), "chat:room1");
//! assert!(!bytes.is_empty());
//! ```

pub mod codec;
pub mod frames;
pub mod topic;
pub mod version;

pub use codec::{decode, encode, encode_envelope, Format, ProtocolError};
pub use frames::{codes, Envelope, Frame, FrameType};
pub use topic::{validate_identifier, Topic, GLOBAL_TOPIC};
pub use version::PROTOCOL_VERSION;
