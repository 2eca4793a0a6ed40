//! # beacon-transport
//!
//! Transport abstraction layer for the Beacon presence engine.
//!
//! - [`Transport`] - the send-capable handle the core keeps per connection
//! - [`TopicPublisher`] - native topic fan-out
//! - [`TopicHub`] - in-process topic pub/sub backing both of the above
//! - [`HubSession`] - a queue-backed [`Transport`] wired to a [`TopicHub`]
//!
//! ```rust,ignore
//! use beacon_transport::{HubSession, TopicHub, Outbound};
//!
//! let hub = Arc::new(TopicHub::new());
//! let (session, mut outbound) = HubSession::new(hub, 256);
//! while let Some(Outbound::Payload(bytes)) = outbound.recv().await {
//!     // write bytes to the socket
//! }
//! ```

pub mod hub;
pub mod session;
pub mod traits;

pub use hub::{HubConfig, HubStats, TopicHub};
pub use session::{HubSession, Outbound, DEFAULT_QUEUE_CAPACITY};
pub use traits::{ConnectionId, TopicPublisher, Transport, TransportError};
