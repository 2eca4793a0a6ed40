//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_core::PresenceError;
use beacon_protocol::codes;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the HTTP API and the WebSocket handshake.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("Server at capacity: {0} connections")]
    AtCapacity(usize),

    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(u8),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl ApiError {
    /// HTTP status and stable error code.
    #[must_use]
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Presence(e) => match e {
                PresenceError::NotConnected(_) => (StatusCode::CONFLICT, "NOT_CONNECTED"),
                PresenceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                PresenceError::InvalidIdentifier(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_IDENTIFIER")
                }
                PresenceError::RoomLimitExceeded { .. } => {
                    (StatusCode::TOO_MANY_REQUESTS, "ROOM_LIMIT_EXCEEDED")
                }
                PresenceError::AlreadyRegistering(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "ALREADY_REGISTERING")
                }
                PresenceError::TransportSendFailure { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "SEND_FAILED")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::AtCapacity(_) => (StatusCode::SERVICE_UNAVAILABLE, "AT_CAPACITY"),
            ApiError::UnsupportedProtocol(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROTOCOL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = %code, status = %status.as_u16(), message = %message, "API error");
        } else {
            tracing::debug!(code = %code, status = %status.as_u16(), message = %message, "API error");
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

/// Protocol error code carried in WebSocket `error` frames.
#[must_use]
pub fn frame_code(error: &PresenceError) -> u16 {
    match error {
        PresenceError::NotConnected(_) => codes::NOT_CONNECTED,
        PresenceError::InvalidIdentifier(_) => codes::INVALID_IDENTIFIER,
        PresenceError::RoomLimitExceeded { .. } => codes::ROOM_LIMIT,
        _ => codes::INTERNAL,
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PresenceError::NotConnected("u1".into()), StatusCode::CONFLICT),
            (PresenceError::NotFound("room x".into()), StatusCode::NOT_FOUND),
            (PresenceError::InvalidIdentifier("empty"), StatusCode::BAD_REQUEST),
            (
                PresenceError::RoomLimitExceeded {
                    user_id: "u1".into(),
                    chat_id: "c".into(),
                    limit: 1,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                PresenceError::AlreadyRegistering("u1".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status().0, expected);
        }
        assert_eq!(
            ApiError::UnsupportedProtocol(9).status(),
            (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROTOCOL")
        );
    }

    #[test]
    fn test_frame_codes() {
        assert_eq!(
            frame_code(&PresenceError::NotConnected("u1".into())),
            codes::NOT_CONNECTED
        );
        assert_eq!(
            frame_code(&PresenceError::NotFound("x".into())),
            codes::INTERNAL
        );
    }
}
