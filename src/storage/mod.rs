//! Storage module for the channel catalog
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Channel records and their status
//! - The per-day crawl budget
//! - The config key/value table

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCatalog;
pub use traits::{CatalogStore, StorageError, StorageResult};

use crate::extract::{CanonicalRef, Category};
use crate::state::{ChannelKind, ChannelStatus};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// Catalog shared between the verifier tasks and the crawl loop
pub type SharedCatalog = Arc<Mutex<SqliteCatalog>>;

/// Wraps a catalog for sharing
pub fn shared(catalog: SqliteCatalog) -> SharedCatalog {
    Arc::new(Mutex::new(catalog))
}

/// Locks the shared catalog
///
/// A poisoned lock is reported as [`StorageError::Poisoned`] so the caller's
/// unit of work is abandoned instead of the whole process.
pub fn lock(catalog: &SharedCatalog) -> StorageResult<MutexGuard<'_, SqliteCatalog>> {
    catalog.lock().map_err(|_| StorageError::Poisoned)
}

/// Represents a channel in the database
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub canonical_id: String,
    pub handle: Option<String>,
    pub kind: ChannelKind,
    pub title: Option<String>,
    pub member_count: Option<i64>,
    pub category: Option<Category>,
    pub status: ChannelStatus,
    /// Id of the collection-point message the reference came from
    pub discovered_from: Option<String>,
    /// Last failure reason
    pub notes: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_crawl_attempt_at: Option<DateTime<Utc>>,
}

/// Longest note kept on a row
pub const MAX_NOTES_CHARS: usize = 200;

impl ChannelRecord {
    /// Creates an unverified record for a reference
    pub fn discovered(reference: &CanonicalRef, now: DateTime<Utc>) -> Self {
        Self {
            canonical_id: reference.key(),
            handle: reference.handle().map(str::to_string),
            kind: ChannelKind::Unknown,
            title: None,
            member_count: None,
            category: None,
            status: ChannelStatus::Discovered,
            discovered_from: None,
            notes: None,
            discovered_at: now,
            last_verified_at: None,
            last_crawl_attempt_at: None,
        }
    }

    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(truncate_notes(notes));
        self
    }

    /// Reference to use when talking to the platform about this row
    ///
    /// Prefers the handle, since a numeric id is only reachable by members.
    pub fn reference(&self) -> Option<CanonicalRef> {
        self.handle
            .as_deref()
            .and_then(CanonicalRef::from_key)
            .or_else(|| CanonicalRef::from_key(&self.canonical_id))
    }
}

pub(crate) fn truncate_notes(notes: &str) -> String {
    notes.chars().take(MAX_NOTES_CHARS).collect()
}

/// Sort order for [`CatalogStore::list_by_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    #[default]
    OldestDiscovered,
    NewestDiscovered,
    MostMembers,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
