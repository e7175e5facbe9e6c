//! Channel-Harvest: a paced channel discovery and crawl pipeline
//!
//! This crate extracts channel references from messages forwarded into a
//! collection point, verifies them against the platform, and feeds verified
//! channels into a throttled crawl loop that never exceeds a daily join quota.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod pacing;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Channel-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Message decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Channel-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{extract_references, CanonicalRef, Message};
pub use pacing::{CallCategory, DelayGovernor};
pub use state::{ChannelKind, ChannelStatus};
pub use storage::{ChannelRecord, SqliteCatalog};
