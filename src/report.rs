//! Outcome counts and catalog statistics for the reporting surface
//!
//! This module provides the numbers the surrounding interface renders:
//! per-message verification counts, catalog totals and the crawl status.

use crate::pipeline::VerifyOutcome;
use crate::state::ChannelStatus;
use crate::storage::{CatalogStore, StorageResult};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

/// Counts for one processed message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// References that produced a new verified row
    pub new: u32,
    /// References already in the catalog (or repeated within the batch)
    pub duplicate: u32,
    /// References dropped by the automation-account filter
    pub bot_skipped: u32,
    pub rejected: u32,
    pub rate_limited: u32,
    /// Timeouts and connectivity errors, left for redelivery
    pub transient: u32,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &VerifyOutcome) {
        match outcome {
            VerifyOutcome::Verified => self.new += 1,
            VerifyOutcome::Duplicate => self.duplicate += 1,
            VerifyOutcome::BotSkipped => self.bot_skipped += 1,
            VerifyOutcome::Rejected => self.rejected += 1,
            VerifyOutcome::RateLimited(_) => self.rate_limited += 1,
            VerifyOutcome::Transient(_) => self.transient += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.new + self.duplicate + self.bot_skipped + self.rejected + self.rate_limited + self.transient
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.new += other.new;
        self.duplicate += other.duplicate;
        self.bot_skipped += other.bot_skipped;
        self.rejected += other.rejected;
        self.rate_limited += other.rate_limited;
        self.transient += other.transient;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "new={} duplicate={} bot_skipped={} rejected={} rate_limited={} transient={}",
            self.new, self.duplicate, self.bot_skipped, self.rejected, self.rate_limited, self.transient
        )
    }
}

/// Catalog totals
#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub total_channels: u64,
    pub by_status: HashMap<ChannelStatus, u64>,
    /// Category counts, largest first
    pub by_category: Vec<(String, u64)>,
}

/// Current crawl state and today's budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStatusSnapshot {
    pub enabled: bool,
    pub quota: u32,
    pub joins_today: u32,
    pub remaining: u32,
}

/// Loads catalog statistics from storage
pub fn load_catalog_stats(store: &dyn CatalogStore) -> StorageResult<CatalogStats> {
    let by_status = store.count_by_status()?;
    let total_channels: u64 = by_status.values().sum();
    let by_category = store.count_by_category()?;

    Ok(CatalogStats {
        total_channels,
        by_status,
        by_category,
    })
}

/// Builds the crawl status for `today`
pub fn crawl_status(
    store: &dyn CatalogStore,
    enabled: bool,
    quota: u32,
    today: NaiveDate,
) -> StorageResult<CrawlStatusSnapshot> {
    let joins_today = store.joins_on(today)?;
    Ok(CrawlStatusSnapshot {
        enabled,
        quota,
        joins_today,
        remaining: quota.saturating_sub(joins_today),
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CatalogStats, status: &CrawlStatusSnapshot) {
    println!("=== Channel Catalog ===\n");

    println!("Overview:");
    println!("  Total channels: {}", stats.total_channels);
    println!();

    println!("Channels by Status:");
    for state in ChannelStatus::all_states() {
        let count = stats.by_status.get(&state).copied().unwrap_or(0);
        let percentage = if stats.total_channels > 0 {
            (count as f64 / stats.total_channels as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.by_category.is_empty() {
        println!("Channels by Category:");
        for (category, count) in &stats.by_category {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    println!("Crawler:");
    println!(
        "  Status: {}",
        if status.enabled { "running" } else { "paused" }
    );
    println!(
        "  Joins today: {} / {} ({} remaining)",
        status.joins_today, status.quota, status.remaining
    );
}
