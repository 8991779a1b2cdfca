//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RENDEZVOUS_HOST, RENDEZVOUS_PORT)
//! - TOML configuration file

use anyhow::{Context, Result};
use rendezvous_core::HubConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

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
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Hub event queue capacity. Sessions wait when it is full.
    #[serde(default = "default_hub_queue_capacity")]
    pub hub_queue_capacity: usize,

    /// Per-session outbound queue capacity. Messages to a session whose
    /// queue is full are dropped.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
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
    std::env::var("RENDEZVOUS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("RENDEZVOUS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_hub_queue_capacity() -> usize {
    1024
}

fn default_outbound_queue_capacity() -> usize {
    256
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
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            hub_queue_capacity: default_hub_queue_capacity(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
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
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "rendezvous.toml",
            "/etc/rendezvous/rendezvous.toml",
            "~/.config/rendezvous/rendezvous.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
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

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.host, self.port))
    }

    /// Get the hub settings derived from the limits.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.limits.hub_queue_capacity,
            outbound_capacity: self.limits.outbound_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".into();
        config.port = 8080;
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        config.host = "not a host".into();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 500
            hub_queue_capacity = 64
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 500);
        assert_eq!(config.limits.outbound_queue_capacity, 256);

        let hub = config.hub_config();
        assert_eq!(hub.queue_capacity, 64);
        assert_eq!(hub.outbound_capacity, 256);
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = Config::from_file("/nonexistent/rendezvous.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
