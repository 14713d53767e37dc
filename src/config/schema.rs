//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Cluster sources: kubeconfig files and the dynamic cluster API.
    pub clusters: ClustersConfig,

    /// Generic external proxy settings.
    pub external_proxy: ExternalProxyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4466").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4466".to_string(),
            tls: None,
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

/// Where clusters come from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClustersConfig {
    /// Allow clusters to be added and removed through `POST/DELETE /cluster`.
    pub enable_dynamic_clusters: bool,

    /// Kubeconfig files to watch, separated by `:` (`;` on Windows).
    /// Empty disables the watcher.
    pub kubeconfig_paths: String,

    /// Quiescence delay before a changed kubeconfig is re-read.
    pub watch_debounce_ms: u64,

    /// How often to retry watching directories that did not exist yet.
    pub rescan_interval_secs: u64,

    /// Single in-cluster bootstrap mode. Not supported by this gateway.
    pub use_in_cluster: bool,
}

impl Default for ClustersConfig {
    fn default() -> Self {
        Self {
            enable_dynamic_clusters: false,
            kubeconfig_paths: String::new(),
            watch_debounce_ms: 500,
            rescan_interval_secs: 10,
            use_in_cluster: false,
        }
    }
}

/// Generic external proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExternalProxyConfig {
    /// Permitted target URL prefixes. Empty means any target is allowed.
    pub allowed_urls: Vec<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Whole-request timeout in seconds. 0 disables it, which long-running
    /// watch requests need.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes accepted by the cluster API.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
