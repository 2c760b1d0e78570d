//! Configuration management for the `iwp` CLI
//!
//! Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/iwp/config.toml`
//! - Windows: `%APPDATA%\iwp\config\config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use iwp_publish::{
    PollPolicy, UploadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_GRAPH_URL, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT, DEFAULT_RETRY_DELAY,
};

/// Environment variable holding the Graph bearer token by default
pub const DEFAULT_TOKEN_ENV: &str = "IWP_GRAPH_TOKEN";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [graph]
/// base_url = "https://graph.microsoft.com/beta/"
/// token_env = "IWP_GRAPH_TOKEN"
/// timeout_seconds = 100
///
/// [upload]
/// max_retries = 50
/// retry_delay_secs = 10
///
/// [poll]
/// interval_secs = 2
/// timeout_secs = 240
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub upload: UploadSettings,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Graph endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_http_timeout() -> u64 {
    100
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Block upload retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Remote state polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_poll_timeout() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_secs()
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, or defaults if missing
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "iwp").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if !self.graph.base_url.starts_with("http://") && !self.graph.base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid Graph URL '{}': must start with http:// or https://",
                self.graph.base_url
            )));
        }

        if self.graph.token_env.is_empty() {
            return Err(ConfigError::ValidationError("token_env must not be empty".to_string()));
        }

        if self.graph.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 || self.poll.timeout_secs < self.poll.interval_secs {
            return Err(ConfigError::ValidationError(
                "poll interval_secs must be positive and not exceed timeout_secs".to_string(),
            ));
        }

        Ok(())
    }

    /// Uploader settings with the default chunk size
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: self.upload.max_retries,
            retry_delay: Duration::from_secs(self.upload.retry_delay_secs),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll.interval_secs),
            timeout: Duration::from_secs(self.poll.timeout_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.graph.timeout_seconds)
    }
}

/// CLI overrides that take precedence over config file values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub graph_url: Option<String>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
}

impl Config {
    /// Apply CLI overrides to the configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(url) = &overrides.graph_url {
            self.graph.base_url = url.clone();
        }
        if overrides.debug == Some(true) {
            self.logging.level = "debug".to_string();
        } else if overrides.verbose == Some(true) {
            self.logging.level = "info".to_string();
        }
        self
    }
}
