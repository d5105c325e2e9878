//! Configuration management for Windowgate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{Result, WindowgateError};

/// Prefix for environment variable overrides, e.g.
/// `WINDOWGATE_RATE_LIMITING__SHORT_WINDOW_MAX=5`.
const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the Windowgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Take the client key from the first `X-Forwarded-For` entry instead of
    /// the peer address. Only enable behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5555))
}

/// Rate limiting configuration.
///
/// Message templates may reference `{max}`, `{interval_secs}` and
/// `{interval_ms}`; they are rendered against the window they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the burst window in milliseconds
    #[serde(default = "default_short_window_ms")]
    pub short_window_ms: u64,

    /// Requests allowed in one burst window
    #[serde(default = "default_short_window_max")]
    pub short_window_max: u64,

    /// Length of the sustained-rate window in milliseconds
    #[serde(default = "default_long_window_ms")]
    pub long_window_ms: u64,

    /// Requests allowed in one sustained-rate window
    #[serde(default = "default_long_window_max")]
    pub long_window_max: u64,

    /// Message returned when the burst window is exhausted
    #[serde(default = "default_window_message")]
    pub short_window_message: String,

    /// Message returned when the sustained-rate window is exhausted
    #[serde(default = "default_window_message")]
    pub long_window_message: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            short_window_ms: default_short_window_ms(),
            short_window_max: default_short_window_max(),
            long_window_ms: default_long_window_ms(),
            long_window_max: default_long_window_max(),
            short_window_message: default_window_message(),
            long_window_message: default_window_message(),
        }
    }
}

fn default_short_window_ms() -> u64 {
    10_000
}

fn default_short_window_max() -> u64 {
    10
}

fn default_long_window_ms() -> u64 {
    60_000
}

fn default_long_window_max() -> u64 {
    60
}

fn default_window_message() -> String {
    "You reached the {max} request limit in {interval_secs} seconds".to_string()
}

impl RateLimitingConfig {
    /// Check that the windows describe a usable limiter.
    pub fn validate(&self) -> Result<()> {
        if self.short_window_ms == 0 || self.long_window_ms == 0 {
            return Err(WindowgateError::Config(
                "window durations must be greater than zero".to_string(),
            ));
        }
        if self.short_window_max == 0 || self.long_window_max == 0 {
            return Err(WindowgateError::Config(
                "window maximums must be greater than zero".to_string(),
            ));
        }
        if self.long_window_ms < self.short_window_ms {
            return Err(WindowgateError::Config(format!(
                "long window ({}ms) must not be shorter than short window ({}ms)",
                self.long_window_ms, self.short_window_ms
            )));
        }
        Ok(())
    }
}

impl WindowgateConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `WINDOWGATE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: WindowgateConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| WindowgateError::Config(e.to_string()))?;

        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WindowgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WindowgateError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }
}
