//! Error types shared by every layer of the crate.

use thiserror::Error;

/// Errors surfaced by addressing, rollup, buffering and queries.
#[derive(Debug, Error)]
pub enum RankError {
    /// Required parameters missing or configuration values rejected
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Any I/O failure reported by the backing store
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    /// A named connection reference has not been registered
    #[error("unknown connection reference: {0}")]
    UnknownConnection(String),

    /// Config file could not be read or parsed
    #[error("config error: {0}")]
    Config(String),

    /// Event payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RankError {
    fn from(e: std::io::Error) -> Self {
        RankError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for RankError {
    fn from(e: toml::de::Error) -> Self {
        RankError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for RankError {
    fn from(e: serde_json::Error) -> Self {
        RankError::Serialization(e.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RankError>;
