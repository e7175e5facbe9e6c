use crate::config::types::{Config, CrawlConfig, PlatformConfig, StorageConfig, VerificationConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Largest real-world UTC offset, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_verification_config(&config.verification)?;
    validate_crawl_config(&config.crawl)?;
    validate_platform_config(&config.platform)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_delay(section: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{}.{} must be a non-negative number of seconds, got {}",
            section, name, value
        )));
    }
    Ok(())
}

/// Validates verification configuration
fn validate_verification_config(config: &VerificationConfig) -> Result<(), ConfigError> {
    validate_delay("verification", "base-delay-secs", config.base_delay_secs)?;
    validate_delay("verification", "jitter-secs", config.jitter_secs)?;

    if config.call_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "verification.call-timeout-secs must be >= 1".to_string(),
        ));
    }

    Regex::new(&config.bot_pattern).map_err(|e| {
        ConfigError::InvalidPattern(format!("bot-pattern '{}': {}", config.bot_pattern, e))
    })?;

    Ok(())
}

/// Validates crawl configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_delay("crawl", "base-delay-secs", config.base_delay_secs)?;
    validate_delay("crawl", "jitter-secs", config.jitter_secs)?;

    if config.daily_quota < 1 {
        return Err(ConfigError::Validation(format!(
            "crawl.daily-quota must be >= 1, got {}",
            config.daily_quota
        )));
    }

    if config.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(ConfigError::Validation(format!(
            "crawl.utc-offset-minutes must be within ±{}, got {}",
            MAX_UTC_OFFSET_MINUTES, config.utc_offset_minutes
        )));
    }

    if config.idle_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "crawl.idle-interval-secs must be >= 1".to_string(),
        ));
    }

    if config.call_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "crawl.call-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates platform configuration
fn validate_platform_config(config: &PlatformConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.preview_base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid preview-base-url '{}': {}",
            config.preview_base_url, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "preview-base-url '{}' must use http or https",
            config.preview_base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "platform.user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
