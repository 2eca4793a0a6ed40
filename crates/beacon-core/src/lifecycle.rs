//! Connection lifecycle state machine.
//!
//! ```text
//! Connecting ──register──▶ Open ──disconnect──▶ Closing ──unregister──▶ Closed
//! ```
//!
//! `Closed` is terminal.

use crate::error::PresenceError;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Open, ConnectionState::Closing)
                | (ConnectionState::Closing, ConnectionState::Closed)
        )
    }
}

/// Shared, atomically updated lifecycle cell.
///
/// The roster and the session handler hold the same cell, so either side can
/// observe or drive the transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// Create a lifecycle in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::InvalidTransition`] if the transition is not
    /// allowed from the current state; the state is left unchanged.
    pub fn advance(&self, next: ConnectionState) -> Result<(), PresenceError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = ConnectionState::from_u8(current);
            if !from.can_transition_to(next) {
                return Err(PresenceError::InvalidTransition { from, to: next });
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Begin closing. Returns `true` if this call moved `Open` to `Closing`.
    pub fn begin_close(&self) -> bool {
        self.advance(ConnectionState::Closing).is_ok()
    }

    /// Drive the lifecycle to `Closed` from `Open` or `Closing`.
    ///
    /// Returns `true` if this call performed the final transition.
    pub fn finish(&self) -> bool {
        self.begin_close();
        self.advance(ConnectionState::Closed).is_ok()
    }

    /// Whether the connection reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
