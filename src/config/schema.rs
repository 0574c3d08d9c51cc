//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the engine server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener and worker pool settings.
    pub server: ServerConfig,

    /// Request decoding limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener and worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name the server will bind to.
    pub hostname: String,

    /// Port the server will bind to.
    pub port: u16,

    /// Listen backlog.
    pub backlog: u32,

    /// Number of worker event loops.
    /// Should be equal to the number of logical cores.
    pub worker_count: usize,

    /// Maximum concurrent connections from a single IP address.
    pub max_connections_per_ip: usize,

    /// Connections queued for a worker loop before dispatch waits.
    pub worker_queue_depth: usize,
}

impl ServerConfig {
    /// `host:port` as configured, for banners and logs.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 8080,
            backlog: 4096,
            worker_count: 8,
            max_connections_per_ip: 128,
            worker_queue_depth: 1024,
        }
    }
}

/// Limits enforced by the request decoder.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum size of the request line plus headers in bytes.
    pub max_header_bytes: usize,

    /// Maximum number of request headers.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10_000_000,
            max_header_bytes: 16 * 1024,
            max_headers: 100,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Longest wait for bytes from a peer, in seconds. Zero disables it.
    pub idle_secs: u64,

    /// Time granted to in-flight connections once shutdown starts, in seconds.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn idle(&self) -> Option<Duration> {
        (self.idle_secs > 0).then(|| Duration::from_secs(self.idle_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_secs: 60,
            shutdown_grace_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "engine_server=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.server.hostname, "localhost");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.backlog, 4096);
        assert_eq!(config.server.worker_count, 8);
        assert_eq!(config.server.max_connections_per_ip, 128);
        assert_eq!(config.limits.max_body_size, 10_000_000);
    }

    #[test]
    fn zero_idle_disables_timeout() {
        let timeouts = TimeoutConfig {
            idle_secs: 0,
            ..TimeoutConfig::default()
        };
        assert_eq!(timeouts.idle(), None);
        assert_eq!(TimeoutConfig::default().idle(), Some(Duration::from_secs(60)));
    }
}
