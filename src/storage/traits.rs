//! Storage traits and error types
//!
//! This module defines the trait interface for catalog backends and
//! associated error types.

use crate::state::ChannelStatus;
use crate::storage::{ChannelRecord, ListOrder, UpsertOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ChannelStatus,
        to: ChannelStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Catalog lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for catalog backend implementations
///
/// Every write that reads before it writes (upsert, budget increment,
/// status change) runs in a single transaction.
pub trait CatalogStore {
    // ===== Channel Lookup =====

    /// Gets a channel by its canonical id
    fn find_by_canonical_id(&self, canonical_id: &str) -> StorageResult<Option<ChannelRecord>>;

    /// Gets a channel by handle, compared case-insensitively
    fn find_by_handle(&self, handle: &str) -> StorageResult<Option<ChannelRecord>>;

    /// Lists channels in a status
    ///
    /// # Arguments
    ///
    /// * `status` - The status to filter on
    /// * `order` - Sort order of the result
    /// * `limit` - Maximum number of rows, or all rows when `None`
    fn list_by_status(
        &self,
        status: ChannelStatus,
        order: ListOrder,
        limit: Option<usize>,
    ) -> StorageResult<Vec<ChannelRecord>>;

    /// Gets the oldest-discovered verified channel not attempted since `attempted_before`
    fn next_crawl_candidate(
        &self,
        attempted_before: DateTime<Utc>,
    ) -> StorageResult<Option<ChannelRecord>>;

    // ===== Channel Mutation =====

    /// Inserts a channel or updates the row with the same identity
    ///
    /// The existing row is matched by canonical id first, then by handle.
    /// A matched row takes the new canonical id, so a handle-keyed row
    /// converges on the platform id once it is known.
    fn upsert(&mut self, record: &ChannelRecord) -> StorageResult<UpsertOutcome>;

    /// Overwrites an unverified row holding `record.canonical_id` with a
    /// verified record
    ///
    /// Only `Discovered` and `Rejected` rows are replaced; a rejection is
    /// overridden because another reference resolved to the same platform
    /// id. Returns `false` when no such row exists.
    fn promote_to_verified(&mut self, record: &ChannelRecord) -> StorageResult<bool>;

    /// Records the outcome of a join attempt
    ///
    /// # Arguments
    ///
    /// * `canonical_id` - The channel that was attempted
    /// * `status` - The status after the attempt
    /// * `notes` - Failure reason, if any
    /// * `attempted_at` - Stamp for `last_crawl_attempt_at`, or `None` to leave it
    fn mark_crawl_result(
        &mut self,
        canonical_id: &str,
        status: ChannelStatus,
        notes: Option<&str>,
        attempted_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Moves a failed channel back to discovered
    fn reset_failed(&mut self, canonical_id: &str) -> StorageResult<()>;

    // ===== Config KV =====

    fn get_config(&self, key: &str) -> StorageResult<Option<String>>;

    fn set_config(&mut self, key: &str, value: &str) -> StorageResult<()>;

    // ===== Crawl Budget =====

    /// Atomically takes one unit of `today`'s budget if fewer than `max` are used
    ///
    /// Returns `true` if the unit was taken.
    fn increment_today_budget_if_under(&mut self, today: NaiveDate, max: u32)
        -> StorageResult<bool>;

    /// Gives back one unit of `today`'s budget, never going below zero
    fn release_today_budget(&mut self, today: NaiveDate) -> StorageResult<()>;

    /// Number of units used on `day`
    fn joins_on(&self, day: NaiveDate) -> StorageResult<u32>;

    // ===== Statistics =====

    fn count_by_status(&self) -> StorageResult<HashMap<ChannelStatus, u64>>;

    /// Channel counts per category, largest first
    fn count_by_category(&self) -> StorageResult<Vec<(String, u64)>>;
}
