//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server identity and bind address.
    pub server: ServerSettings,

    /// Connection handling strategy.
    pub connector: ConnectorConfig,

    /// Applications installed at startup.
    pub applications: Vec<ApplicationConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server name, reported to applications.
    pub name: String,

    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port. 0 picks an ephemeral port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "app-router".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Connector strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Accept loop plus a fixed pool of blocking workers.
    #[default]
    Blocking,
    /// Async runtime; dispatch offloaded to blocking threads.
    Reactor,
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorKind::Blocking => f.write_str("blocking"),
            ConnectorKind::Reactor => f.write_str("reactor"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub kind: ConnectorKind,

    /// Pool size (blocking) or runtime worker threads (reactor).
    pub worker_threads: usize,

    /// Accepted connections waiting for a blocking worker before the accept
    /// loop stalls.
    pub queue_depth: usize,

    /// Time the reactor waits for in-flight connections on close.
    pub drain_timeout_secs: u64,

    /// Largest request body read and discarded before responding; larger
    /// bodies close the connection after the response.
    pub max_discard_body_bytes: u64,
}

impl ConnectorConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            kind: ConnectorKind::Blocking,
            worker_threads: 16,
            queue_depth: 64,
            drain_timeout_secs: 5,
            max_discard_body_bytes: 1024 * 1024,
        }
    }
}

/// One installed application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// Application root; the descriptor lives at `<root>/WEB-INF/web.xml`.
    pub root: PathBuf,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
