//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`beacon.toml`, `/etc/beacon/beacon.toml`,
//!   `~/.config/beacon/beacon.toml`)
//! - Environment variables (`BEACON_HOST`, `BEACON_PORT`), which win over the file

use anyhow::{Context, Result};
use beacon_core::{BroadcastConfig, FanoutMode, RosterConfig};
use beacon_protocol::Format;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Fan-out configuration.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Outbound queue capacity per session.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Wire format for frames: `json` or `msgpack`.
    #[serde(default)]
    pub format: Format,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum rooms per connection.
    #[serde(default = "default_max_rooms")]
    pub max_rooms_per_connection: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// `topic` publishes natively; `direct` iterates recipients and supports exclusion.
    #[serde(default)]
    pub strategy: FanoutMode,

    /// Per-recipient write timeout in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Transport close timeout in milliseconds.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_queue_capacity() -> usize {
    beacon_transport::DEFAULT_QUEUE_CAPACITY
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_rooms() -> usize {
    100
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_write_timeout() -> u64 {
    5_000
}

fn default_close_timeout() -> u64 {
    5_000
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_heartbeat_timeout() -> u64 {
    60_000 // 60 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            fanout: FanoutConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            queue_capacity: default_queue_capacity(),
            format: Format::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_rooms_per_connection: default_max_rooms(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            strategy: FanoutMode::default(),
            write_timeout_ms: default_write_timeout(),
            close_timeout_ms: default_close_timeout(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or an
    /// override is malformed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "beacon.toml",
            "/etc/beacon/beacon.toml",
            "~/.config/beacon/beacon.toml",
        ];

        let mut config = Self::default();
        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                info!("Loading config from {}", expanded);
                config = Self::from_file(expanded.as_ref())?;
                break;
            }
        }

        config.apply_overrides(
            std::env::var("BEACON_HOST").ok(),
            std::env::var("BEACON_PORT").ok(),
        )?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply host and port overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `port` is not a valid port number.
    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid BEACON_PORT: {}", port))?;
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Roster settings derived from the limits and fan-out sections.
    #[must_use]
    pub fn roster_config(&self) -> RosterConfig {
        RosterConfig {
            max_rooms_per_connection: self.limits.max_rooms_per_connection,
            close_timeout: Duration::from_millis(self.fanout.close_timeout_ms),
        }
    }

    /// Broadcaster settings.
    #[must_use]
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            format: self.transport.format,
            write_timeout: Duration::from_millis(self.fanout.write_timeout_ms),
        }
    }
}
