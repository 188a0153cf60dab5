//! Configuration management for the YUPlan gateway.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, YuplanError};
use crate::http::IdentitySource;
use crate::ratelimit::LimitConfig;

/// Environment variable overriding the listen port.
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding the requests allowed per window.
pub const ENV_RATE_LIMIT_REQUESTS: &str = "RATE_LIMIT_REQUESTS";
/// Environment variable overriding the window length in seconds.
pub const ENV_RATE_LIMIT_WINDOW_SECS: &str = "RATE_LIMIT_WINDOW_SECS";

/// Main configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YuplanConfig {
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
    /// HTTP server address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// How client identities are derived from requests
    #[serde(default)]
    pub identity_source: IdentitySource,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            identity_source: IdentitySource::default(),
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Whether requests are rate limited at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requests allowed per client in one window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Idle client sweep interval in seconds, two windows if unset
    #[serde(default)]
    pub cleanup_interval_secs: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_window() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Build the limiter configuration described by this section.
    pub fn limit_config(&self) -> LimitConfig {
        let config = LimitConfig::new(
            self.requests_per_window,
            Duration::from_secs(self.window_secs),
        );

        match self.cleanup_interval_secs {
            Some(secs) => config.with_cleanup_interval(Duration::from_secs(secs)),
            None => config,
        }
    }
}

impl YuplanConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| YuplanError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var::<u16>(&lookup, ENV_PORT)? {
            self.server.addr.set_port(port);
        }
        if let Some(requests) = parse_var::<u64>(&lookup, ENV_RATE_LIMIT_REQUESTS)? {
            self.rate_limiting.requests_per_window = requests;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_RATE_LIMIT_WINDOW_SECS)? {
            self.rate_limiting.window_secs = secs;
        }
        Ok(())
    }

    /// Check that the configuration can start a server.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.enabled {
            self.rate_limiting.limit_config().validate()?;
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| YuplanError::Config(format!("Invalid {}={:?}: {}", key, value, e))),
        None => Ok(None),
    }
}
