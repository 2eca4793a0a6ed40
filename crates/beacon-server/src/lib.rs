//! # beacon-server
//!
//! WebSocket sessions and the HTTP control API on top of `beacon-core`.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{router, run_server, AppState};

/// Log filter used when `RUST_LOG` is not set. Covers every `beacon_*` crate.
pub const DEFAULT_LOG_FILTER: &str = "beacon=debug";
