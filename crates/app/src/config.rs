//! Application configuration
//!
//! Loaded from `tasbih.toml` in the platform config directory, or from an
//! explicit path. Every field has a default, so a missing file or a partial
//! one is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "tasbih.toml";

/// Error type for config loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// SQLite file for counters; `None` keeps them in memory
    pub database: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], tasbih_net::DEFAULT_PORT)),
            database: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, `host:port`
    pub server: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Consecutive not-found polls before the session closes
    pub not_found_limit: u32,
    /// Consecutive failed requests before connection trouble is reported
    pub transient_alert_after: u32,
    /// Base of shareable join links
    pub join_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", tasbih_net::DEFAULT_PORT),
            poll_interval_ms: 2000,
            request_timeout_ms: 5000,
            not_found_limit: 2,
            transient_alert_after: 5,
            join_base_url: "https://tasbih.app".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            not_found_limit: self.not_found_limit,
            transient_alert_after: self.transient_alert_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn,tasbih=info,tasbih_core=info,tasbih_net=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default location when `path` is `None`.
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => {
                    Self::from_toml(&std::fs::read_to_string(&path)?)?
                }
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// `<config dir>/tasbih.toml`, when the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "onyx", "tasbih").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "client.poll_interval_ms must be positive".into(),
            ));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "client.request_timeout_ms must be positive".into(),
            ));
        }
        if self.client.not_found_limit == 0 {
            return Err(ConfigError::Invalid(
                "client.not_found_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
