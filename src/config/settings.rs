//! Configuration settings.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RpcError;

/// Well-known socket path owned by the allpath runner daemon.
pub const DEFAULT_ENDPOINT_PATH: &str = "/tmp/allpath_runner.sock";

/// Envelope `package` this client addresses.
pub const DEFAULT_PACKAGE: &str = "dojutsu-agent";

/// Main configuration structure.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client configuration: where to call and how long to wait.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Path to the daemon's Unix socket.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: PathBuf,
    /// Budget for one whole call (connect, write, read) in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Value sent in every request's `package` field.
    #[serde(default = "default_package")]
    pub package: String,
    /// Largest response accepted, in bytes.
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
}

/// Reference server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Path to bind the Unix socket at.
    #[serde(default = "default_endpoint_path")]
    pub socket_path: PathBuf,
    /// Socket file permissions (e.g., "0600").
    #[serde(default = "default_socket_permissions")]
    pub socket_permissions: String,
    /// Package this server answers for.
    #[serde(default = "default_package")]
    pub package: String,
    /// Largest request accepted, in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// How long to wait for the client's half-close.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Maximum connections served at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_connections: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_endpoint_path() -> PathBuf {
    PathBuf::from(DEFAULT_ENDPOINT_PATH)
}

fn default_call_timeout_ms() -> u64 {
    120_000
}

fn default_package() -> String {
    DEFAULT_PACKAGE.to_string()
}

fn default_max_response_size() -> usize {
    16 * 1_048_576
}

fn default_socket_permissions() -> String {
    "0600".to_string()
}

fn default_max_request_size() -> usize {
    1_048_576 // 1MB
}

fn default_read_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    64
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_path: default_endpoint_path(),
            call_timeout_ms: default_call_timeout_ms(),
            package: default_package(),
            max_response_size: default_max_response_size(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at another socket.
    pub fn new(endpoint_path: impl Into<PathBuf>) -> Self {
        Self::default().with_endpoint_path(endpoint_path)
    }

    pub fn with_endpoint_path(mut self, endpoint_path: impl Into<PathBuf>) -> Self {
        self.endpoint_path = endpoint_path.into();
        self
    }

    /// Set the whole-call budget. Sub-millisecond remainders are rounded up.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis();
        let rounded_up = if Duration::from_millis(millis as u64) < timeout {
            millis + 1
        } else {
            millis
        };
        self.call_timeout_ms = u64::try_from(rounded_up).unwrap_or(u64::MAX);
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.max_response_size = max;
        self
    }

    /// The whole-call budget as a `Duration`.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Validate the client settings.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.endpoint_path.as_os_str().is_empty() {
            return Err(config_error("client.endpoint_path must not be empty"));
        }
        if self.call_timeout_ms == 0 {
            return Err(config_error("client.call_timeout_ms must be greater than zero"));
        }
        if self.package.trim().is_empty() {
            return Err(config_error("client.package must not be empty"));
        }
        if self.max_response_size == 0 {
            return Err(config_error("client.max_response_size must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_endpoint_path(),
            socket_permissions: default_socket_permissions(),
            package: default_package(),
            max_request_size: default_max_request_size(),
            read_timeout_seconds: default_read_timeout(),
            max_concurrent_connections: default_max_concurrent(),
        }
    }
}

impl ServerConfig {
    /// Default configuration bound at another socket.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    /// Validate the server settings.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.socket_permissions.is_empty()
            || !self.socket_permissions.chars().all(|c| ('0'..='7').contains(&c))
        {
            return Err(config_error(format!(
                "Invalid socket permissions '{}'. Must be octal (e.g., '0600')",
                self.socket_permissions
            )));
        }
        if self.package.trim().is_empty() {
            return Err(config_error("server.package must not be empty"));
        }
        if self.max_request_size == 0 || self.max_concurrent_connections == 0 {
            return Err(config_error(
                "server.max_request_size and server.max_concurrent_connections must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Validate the logging settings.
    pub fn validate(&self) -> Result<(), RpcError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.format, valid_formats
            )));
        }

        Ok(())
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RpcError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RpcError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| RpcError::Config {
            message: format!("Invalid config file '{}': {}", path.display(), e),
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, RpcError> {
        let settings: Settings = toml::from_str(content).map_err(|e| RpcError::Config {
            message: e.to_string(),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), RpcError> {
        self.client.validate()?;
        self.server.validate()?;
        self.logging.validate()
    }
}

fn config_error(message: impl Into<String>) -> RpcError {
    RpcError::Config {
        message: message.into(),
    }
}
