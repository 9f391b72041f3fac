//! # Host Configuration
//!
//! TOML configuration for the controller, the device link, and the HTTP API.
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [device]
//! base_url = "http://192.168.4.1"
//! request_timeout_ms = 2000
//! retries = 2
//! retry_backoff_ms = 250
//! emergency_stop_attempts = 5
//!
//! [telemetry]
//! poll_interval_ms = 2000
//!
//! [run]
//! tick_interval_ms = 200
//! ```
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use roti_host::config::Config;
//! let config: Config = toml::from_str("[run]\ntick_interval_ms = 100").unwrap();
//! assert_eq!(config.run.tick_interval_ms, 100);
//! assert_eq!(config.telemetry.poll_interval_ms, 2000);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Device link configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Operator-configured address of the maker's controller board.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra attempts for idempotent requests (`GET /status`).
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Total attempts before an emergency stop is reported as failed.
    #[serde(default = "default_emergency_stop_attempts")]
    pub emergency_stop_attempts: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            emergency_stop_attempts: default_emergency_stop_attempts(),
        }
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Telemetry polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms() }
    }
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Production run timer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { tick_interval_ms: default_tick_interval_ms() }
    }
}

impl RunConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Validate intervals, attempt counts, and the device address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("device.request_timeout_ms must be > 0".to_string()));
        }
        if self.device.emergency_stop_attempts == 0 {
            return Err(ConfigError::Invalid("device.emergency_stop_attempts must be >= 1".to_string()));
        }
        if self.telemetry.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("telemetry.poll_interval_ms must be > 0".to_string()));
        }
        if self.run.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("run.tick_interval_ms must be > 0".to_string()));
        }
        if reqwest::Url::parse(&self.device.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "device.base_url '{}' is not a valid URL",
                self.device.base_url
            )));
        }
        Ok(())
    }
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_base_url() -> String { "http://192.168.4.1".to_string() }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_retries() -> u32 { 2 }
fn default_retry_backoff_ms() -> u64 { 250 }
fn default_emergency_stop_attempts() -> u32 { 5 }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_tick_interval_ms() -> u64 { 200 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.device.request_timeout_ms, 2000);
        assert_eq!(config.device.retries, 2);
        assert_eq!(config.device.emergency_stop_attempts, 5);
        assert_eq!(config.telemetry.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.run.tick_interval(), Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("roti.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[device]\nbase_url = 'http://10.0.0.7'\nretries = 0").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.device.base_url, "http://10.0.0.7");
        assert_eq!(config.device.retries, 0);
        // Defaults for missing fields
        assert_eq!(config.device.request_timeout_ms, 2000);
        assert_eq!(config.run.tick_interval_ms, 200);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: Config = toml::from_str("[telemetry]\npoll_interval_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config: Config = toml::from_str("[run]\ntick_interval_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config: Config = toml::from_str("[device]\nbase_url = 'not a url'").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
