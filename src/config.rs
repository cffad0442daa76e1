//! Process-wide configuration
//!
//! Loaded from TOML, then overridden from environment variables:
//!
//! - `REDISRANK_BUFFER_SIZE`: write buffer capacity (0 or 1 disables it)
//! - `REDISRANK_GROUP_SEPARATOR`: label and stat group separator
//! - `REDISRANK_REDIS_URL`: switch the default connection to Redis
//!
//! ```toml
//! buffer_size = 20
//! group_separator = "/"
//!
//! [default_connection]
//! backend = "memory"
//!
//! [connections.archive]
//! backend = "redis"
//! url = "redis://127.0.0.1:6379/14"
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

use crate::error::{RankError, Result};
use crate::keys::GROUP_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Store implementation behind a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store
    #[default]
    Memory,
    /// Redis server (requires the `redis-store` feature)
    Redis,
}

/// Parameters for one backing-store connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub backend: StoreBackend,
    /// Server url, required for Redis
    pub url: Option<String>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Write buffer capacity; 0 and 1 disable buffering
    pub buffer_size: usize,
    /// Has no effect. Buffer state is always lock-guarded; the key is
    /// only parsed so existing config files keep loading.
    pub thread_safe: bool,
    /// Separator for label paths and grouped stat names
    pub group_separator: String,
    pub default_connection: ConnectionConfig,
    /// Additional connections addressable by name
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub logging: LoggingConfig,
}

impl Default for RankConfig {
    fn default() -> Self {
        RankConfig {
            buffer_size: 0,
            thread_safe: true,
            group_separator: GROUP_SEPARATOR.to_string(),
            default_connection: ConnectionConfig::default(),
            connections: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RankConfig {
    /// Configuration for tests: in-memory store, buffering off
    pub fn test() -> Self {
        RankConfig {
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RankConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `REDISRANK_*` environment overrides, then validate
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(size) = std::env::var("REDISRANK_BUFFER_SIZE") {
            self.buffer_size = size.trim().parse().map_err(|_| {
                RankError::InvalidConfiguration(format!(
                    "REDISRANK_BUFFER_SIZE is not an integer: '{}'",
                    size
                ))
            })?;
        }
        if let Ok(separator) = std::env::var("REDISRANK_GROUP_SEPARATOR") {
            self.group_separator = separator;
        }
        if let Ok(url) = std::env::var("REDISRANK_REDIS_URL") {
            self.default_connection = ConnectionConfig {
                backend: StoreBackend::Redis,
                url: Some(url),
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the rest of the crate cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.group_separator.is_empty() {
            return Err(RankError::InvalidConfiguration(
                "group_separator must not be empty".to_string(),
            ));
        }
        let named = self.connections.iter().map(|(n, c)| (n.as_str(), c));
        for (name, conn) in std::iter::once(("default", &self.default_connection)).chain(named) {
            if conn.backend == StoreBackend::Redis && conn.url.as_deref().map_or(true, str::is_empty) {
                return Err(RankError::InvalidConfiguration(format!(
                    "connection '{}' uses the redis backend without a url",
                    name
                )));
            }
        }
        Ok(())
    }
}
