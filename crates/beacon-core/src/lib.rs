//! # beacon-core
//!
//! Presence tracking, room membership and fan-out for the Beacon realtime
//! server.
//!
//! - **Roster** - Connection registry and room index behind a single lock
//! - **Rooms** - Join/leave with a bidirectional membership invariant
//! - **Query** - Read-only presence views
//! - **Broadcast** - Per-user sends and room/global fan-out
//! - **Lifecycle** - Connecting → Open → Closing → Closed
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │◀────│ Broadcaster │────▶│   Roster    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                       │
//!        └──────── subscribe / unsubscribe ──────┘
//! ```
//!
//! The roster subscribes transports to `user:<id>`, `chat:<id>` and `global`
//! while it holds its lock. Sends never happen under the lock.

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod query;
pub mod registry;
pub mod rooms;
mod table;

#[cfg(test)]
mod testing;

pub use broadcast::{
    BroadcastConfig, Broadcaster, Courier, Delivery, DirectSend, FanoutMode, FanoutReport,
    FanoutStrategy, FanoutTarget, TopicPublish,
};
pub use connection::{ChatId, Connection, ConnectionInfo, ConnectionMeta, UserId};
pub use error::PresenceError;
pub use lifecycle::{ConnectionState, Lifecycle};
pub use query::RosterStats;
pub use registry::{Roster, RosterConfig};
pub use table::RoomSnapshot;
