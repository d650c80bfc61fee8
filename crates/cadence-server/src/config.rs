//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (HOST, PORT, WS_PORT, CLEANUP_INTERVAL, ...)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP surface.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port for WebSocket connections; defaults to `port`.
    #[serde(default = "default_ws_port")]
    pub ws_port: Option<u16>,

    /// Deployment environment (`production` | `development`).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Session cleanup configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Offline tracking and reaping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup ticker period; also the offline-user grace period, in ms.
    #[serde(default = "default_cleanup_interval")]
    pub interval_ms: u64,

    /// How long an empty session survives before deletion, in ms.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Liveness probe period in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Explicit log level; when unset, picked from the environment kind.
    #[serde(default = "default_log_level")]
    pub level: Option<String>,

    /// Disable all log output when false.
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_ws_port() -> Option<u16> {
    std::env::var("WS_PORT").ok().and_then(|p| p.parse().ok())
}

fn default_environment() -> String {
    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_cleanup_interval() -> u64 {
    std::env::var("CLEANUP_INTERVAL")
        .ok()
        .and_then(|ms| ms.parse().ok())
        .unwrap_or(300_000) // 5 minutes
}

fn default_session_timeout() -> u64 {
    std::env::var("SESSION_TIMEOUT")
        .ok()
        .and_then(|ms| ms.parse().ok())
        .unwrap_or(600_000) // 10 minutes
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_log_level() -> Option<String> {
    std::env::var("LOG_LEVEL").ok()
}

fn default_log_enabled() -> bool {
    std::env::var("LOG_ENABLED")
        .map(|v| !matches!(v.as_str(), "false" | "0"))
        .unwrap_or(true)
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: default_ws_port(),
            environment: default_environment(),
            transport: TransportConfig::default(),
            cleanup: CleanupConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            log: LogConfig::default(),
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

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_cleanup_interval(),
            session_timeout_ms: default_session_timeout(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            enabled: default_log_enabled(),
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
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "cadence.toml",
            "/etc/cadence/cadence.toml",
            "~/.config/cadence/cadence.toml",
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

    /// The effective WebSocket port.
    #[must_use]
    pub fn ws_port(&self) -> u16 {
        self.ws_port.unwrap_or(self.port)
    }

    /// Whether WebSocket upgrades share the HTTP listener.
    #[must_use]
    pub fn shared_listener(&self) -> bool {
        self.ws_port() == self.port
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.heartbeat.interval_ms, 30_000);
        assert_eq!(config.cleanup.interval_ms, 300_000);
        assert_eq!(config.cleanup.session_timeout_ms, 600_000);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert!(config.shared_listener());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            ws_port = 9001
            environment = "production"

            [cleanup]
            interval_ms = 60000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.ws_port(), 9001);
        assert!(!config.shared_listener());
        assert!(config.is_production());
        assert_eq!(config.cleanup.interval_ms, 60_000);
        // Unset sections keep their defaults.
        assert_eq!(config.cleanup.session_timeout_ms, 600_000);
    }
}
