//! Codec for encoding and decoding Beacon frames.
//!
//! Two encodings are supported:
//!
//! - JSON: one frame per WebSocket text message, no framing.
//! - MessagePack: 4-byte big-endian length prefix followed by the
//!   MessagePack-encoded frame, suitable for binary streams.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frames::{Envelope, Frame};

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON text.
    #[default]
    Json,
    /// Length-prefixed MessagePack.
    #[serde(alias = "messagepack")]
    Msgpack,
}

impl Format {
    /// Whether frames in this format travel as text.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Format::Json)
    }
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame, format: Format) -> Result<Bytes, ProtocolError> {
    match format {
        Format::Json => {
            let payload = serde_json::to_vec(frame)?;
            if payload.len() > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge(payload.len()));
            }
            Ok(Bytes::from(payload))
        }
        Format::Msgpack => {
            let mut buf = BytesMut::new();
            encode_into(frame, &mut buf)?;
            Ok(buf.freeze())
        }
    }
}

/// Encode an application envelope as an event frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_envelope(envelope: &Envelope, format: Format) -> Result<Bytes, ProtocolError> {
    encode(&Frame::from(envelope.clone()), format)
}

/// Append a length-prefixed MessagePack frame to `buf`.
fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a single frame.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8], format: Format) -> Result<Frame, ProtocolError> {
    match format {
        Format::Json => {
            if data.len() > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge(data.len()));
            }
            Ok(serde_json::from_slice(data)?)
        }
        Format::Msgpack => {
            if data.len() < LENGTH_PREFIX_SIZE {
                return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
            }

            let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if length > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge(length));
            }

            let total_size = LENGTH_PREFIX_SIZE + length;
            if data.len() < total_size {
                return Err(ProtocolError::Incomplete(total_size - data.len()));
            }

            Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
        }
    }
}
