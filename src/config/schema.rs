//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control
//! plane. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Discovery listener configuration (bind address, TLS, stream cap).
    pub listener: ListenerConfig,

    /// Discovery protocol tuning.
    pub discovery: DiscoveryConfig,

    /// Snapshot published at startup.
    pub bootstrap: BootstrapConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:18000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent discovery streams.
    pub max_streams: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:18000".to_string(),
            tls: None,
            max_streams: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Discovery protocol settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// First delay before re-pushing a rejected version.
    pub nack_backoff_base_ms: u64,

    /// Upper bound for the rejection backoff.
    pub nack_backoff_max_ms: u64,

    /// How long a REST fetch waits for a newer version before answering 304.
    pub fetch_timeout_secs: u64,

    /// Close a stream after sending a rejection for a malformed request.
    pub close_on_malformed: bool,

    /// Per-stream buffer for inbound and outbound messages.
    pub stream_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            nack_backoff_base_ms: 1_000,
            nack_backoff_max_ms: 30_000,
            fetch_timeout_secs: 30,
            close_on_malformed: true,
            stream_buffer: 64,
        }
    }
}

/// Snapshot loaded from disk at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// TOML or JSON snapshot document.
    pub snapshot_path: Option<String>,

    /// Node group the document is published under, unless it names one.
    pub node_group: String,

    /// Re-publish when the file changes.
    pub watch: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            node_group: "default".to_string(),
            watch: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Admin request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:18001".to_string(),
        }
    }
}
