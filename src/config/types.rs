use crate::pacing::DelayConfig;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Channel-Harvest
///
/// Every section is optional; a missing section or key takes its default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub verification: VerificationConfig,
    pub crawl: CrawlConfig,
    pub platform: PlatformConfig,
    pub storage: StorageConfig,
}

/// Pacing and filtering of reference verification
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VerificationConfig {
    /// Fixed part of the delay before each resolve (seconds)
    pub base_delay_secs: f64,

    /// Upper bound of the random part added to the base delay (seconds)
    pub jitter_secs: f64,

    /// Resolve calls taking longer than this count as transient errors
    pub call_timeout_secs: u64,

    /// Handles matching this pattern are automation accounts and are skipped
    pub bot_pattern: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        let delay = DelayConfig::verification_default();
        Self {
            base_delay_secs: delay.base.as_secs_f64(),
            jitter_secs: delay.jitter.as_secs_f64(),
            call_timeout_secs: 20,
            bot_pattern: "(?i)bot$".to_string(),
        }
    }
}

impl VerificationConfig {
    pub fn delay(&self) -> DelayConfig {
        DelayConfig::from_secs(self.base_delay_secs, self.jitter_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Fixed part of the delay before each join (seconds)
    pub base_delay_secs: f64,

    /// Upper bound of the random part added to the base delay (seconds)
    pub jitter_secs: f64,

    /// Maximum joins per calendar day
    pub daily_quota: u32,

    /// Offset from UTC of the day boundary, in minutes
    pub utc_offset_minutes: i32,

    /// How long the loop sleeps while disabled or out of work (seconds)
    pub idle_interval_secs: u64,

    pub call_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let delay = DelayConfig::crawl_default();
        Self {
            base_delay_secs: delay.base.as_secs_f64(),
            jitter_secs: delay.jitter.as_secs_f64(),
            daily_quota: 10,
            utc_offset_minutes: 0,
            idle_interval_secs: 300,
            call_timeout_secs: 30,
        }
    }
}

impl CrawlConfig {
    pub fn delay(&self) -> DelayConfig {
        DelayConfig::from_secs(self.base_delay_secs, self.jitter_secs)
    }
}

/// Platform web-preview access
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// Base URL of the public channel preview
    pub preview_base_url: String,

    pub user_agent: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            preview_base_url: "https://t.me".to_string(),
            user_agent: format!("channel-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Catalog location
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./data/channels.db".to_string(),
        }
    }
}
