//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the observation
//! layer and its demo host. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::observation::convention::{CLIENT_OBSERVATION_NAME, SERVER_OBSERVATION_NAME};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Master switch. When false, observations run but nothing is emitted.
    pub enabled: bool,

    /// Demo host server settings.
    pub server: ServerConfig,

    /// Observation names used by the default conventions.
    pub conventions: ConventionConfig,

    /// Metrics sink and exporter.
    pub metrics: MetricsConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server: ServerConfig::default(),
            conventions: ConventionConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Backend address (e.g., "127.0.0.1:9000") that `/upstream/*` forwards to.
    /// `None` disables the forwarding route.
    pub upstream_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            upstream_address: None,
        }
    }
}

/// Names of the observations produced by the default conventions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConventionConfig {
    /// Name for outbound exchanges.
    pub client_name: String,

    /// Name for inbound exchanges.
    pub server_name: String,
}

impl Default for ConventionConfig {
    fn default() -> Self {
        Self {
            client_name: CLIENT_OBSERVATION_NAME.to_string(),
            server_name: SERVER_OBSERVATION_NAME.to_string(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record observation durations as metrics.
    pub enabled: bool,

    /// Prometheus exporter bind address. `None` disables the exporter.
    pub exporter_address: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exporter_address: Some("0.0.0.0:9090".to_string()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive). `RUST_LOG` takes precedence.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Emit one tracing event per stopped observation.
    pub log_observations: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            log_observations: true,
        }
    }
}
