//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CatalogStore trait.

use crate::extract::Category;
use crate::state::{ChannelKind, ChannelStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CatalogStore, StorageError, StorageResult};
use crate::storage::{truncate_notes, ChannelRecord, ListOrder, UpsertOutcome};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const CHANNEL_COLUMNS: &str = "canonical_id, handle, kind, title, member_count, category, status,
     discovered_from, notes, discovered_at, last_verified_at, last_crawl_attempt_at";

/// SQLite catalog backend
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Opens or creates the catalog at `path`
    ///
    /// Missing parent directories are created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory catalog
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn update_existing(
        tx: &rusqlite::Transaction<'_>,
        row_id: i64,
        current: ChannelStatus,
        record: &ChannelRecord,
    ) -> StorageResult<()> {
        if current != record.status && !current.can_transition_to(record.status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: record.status,
            });
        }
        Self::write_row(tx, row_id, record)
    }

    fn write_row(
        tx: &rusqlite::Transaction<'_>,
        row_id: i64,
        record: &ChannelRecord,
    ) -> StorageResult<()> {
        tx.execute(
            "UPDATE channels SET
                canonical_id = ?1,
                handle = COALESCE(?2, handle),
                kind = ?3,
                title = COALESCE(?4, title),
                member_count = ?5,
                category = COALESCE(?6, category),
                status = ?7,
                discovered_from = COALESCE(discovered_from, ?8),
                notes = ?9,
                last_verified_at = COALESCE(?10, last_verified_at),
                last_crawl_attempt_at = COALESCE(?11, last_crawl_attempt_at)
             WHERE id = ?12",
            params![
                record.canonical_id,
                record.handle,
                record.kind.to_db_string(),
                record.title,
                record.member_count,
                record.category.map(|c| c.to_db_string()),
                record.status.to_db_string(),
                record.discovered_from,
                record.notes.as_deref().map(truncate_notes),
                record.last_verified_at.as_ref().map(format_ts),
                record.last_crawl_attempt_at.as_ref().map(format_ts),
                row_id,
            ],
        )
        .map_err(constraint_error)?;
        Ok(())
    }

    fn insert_new(tx: &rusqlite::Transaction<'_>, record: &ChannelRecord) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO channels (canonical_id, handle, kind, title, member_count, category,
             status, discovered_from, notes, discovered_at, last_verified_at, last_crawl_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.canonical_id,
                record.handle,
                record.kind.to_db_string(),
                record.title,
                record.member_count,
                record.category.map(|c| c.to_db_string()),
                record.status.to_db_string(),
                record.discovered_from,
                record.notes.as_deref().map(truncate_notes),
                format_ts(&record.discovered_at),
                record.last_verified_at.as_ref().map(format_ts),
                record.last_crawl_attempt_at.as_ref().map(format_ts),
            ],
        )
        .map_err(constraint_error)?;
        Ok(())
    }

    fn current_status(&self, canonical_id: &str) -> StorageResult<ChannelStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM channels WHERE canonical_id = ?1",
                params![canonical_id],
                |row| row.get(0),
            )
            .optional()?;

        let status = status.ok_or_else(|| StorageError::ChannelNotFound(canonical_id.to_string()))?;
        ChannelStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Database(format!("Unknown status '{}'", status)))
    }
}

impl CatalogStore for SqliteCatalog {
    // ===== Channel Lookup =====

    fn find_by_canonical_id(&self, canonical_id: &str) -> StorageResult<Option<ChannelRecord>> {
        let sql = format!("SELECT {} FROM channels WHERE canonical_id = ?1", CHANNEL_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![canonical_id], channel_from_row)
            .optional()?;
        Ok(record)
    }

    fn find_by_handle(&self, handle: &str) -> StorageResult<Option<ChannelRecord>> {
        let sql = format!(
            "SELECT {} FROM channels WHERE handle = ?1 COLLATE NOCASE",
            CHANNEL_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![handle], channel_from_row)
            .optional()?;
        Ok(record)
    }

    fn list_by_status(
        &self,
        status: ChannelStatus,
        order: ListOrder,
        limit: Option<usize>,
    ) -> StorageResult<Vec<ChannelRecord>> {
        let order_by = match order {
            ListOrder::OldestDiscovered => "discovered_at ASC, id ASC",
            ListOrder::NewestDiscovered => "discovered_at DESC, id DESC",
            ListOrder::MostMembers => "COALESCE(member_count, 0) DESC, id ASC",
        };
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let sql = format!(
            "SELECT {} FROM channels WHERE status = ?1 ORDER BY {} LIMIT ?2",
            CHANNEL_COLUMNS, order_by
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![status.to_db_string(), limit], channel_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn next_crawl_candidate(
        &self,
        attempted_before: DateTime<Utc>,
    ) -> StorageResult<Option<ChannelRecord>> {
        let sql = format!(
            "SELECT {} FROM channels
             WHERE status = ?1 AND (last_crawl_attempt_at IS NULL OR last_crawl_attempt_at < ?2)
             ORDER BY discovered_at ASC, id ASC LIMIT 1",
            CHANNEL_COLUMNS
        );
        let record = self
            .conn
            .query_row(
                &sql,
                params![
                    ChannelStatus::Verified.to_db_string(),
                    format_ts(&attempted_before)
                ],
                channel_from_row,
            )
            .optional()?;
        Ok(record)
    }

    // ===== Channel Mutation =====

    fn upsert(&mut self, record: &ChannelRecord) -> StorageResult<UpsertOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, status FROM channels WHERE canonical_id = ?1",
                params![record.canonical_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if existing.is_none() {
            if let Some(handle) = &record.handle {
                existing = tx
                    .query_row(
                        "SELECT id, status FROM channels WHERE handle = ?1 COLLATE NOCASE",
                        params![handle],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
            }
        }

        let outcome = match existing {
            Some((row_id, status)) => {
                let current = ChannelStatus::from_db_string(&status)
                    .ok_or_else(|| StorageError::Database(format!("Unknown status '{}'", status)))?;
                Self::update_existing(&tx, row_id, current, record)?;
                UpsertOutcome::Updated
            }
            None => {
                Self::insert_new(&tx, record)?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn promote_to_verified(&mut self, record: &ChannelRecord) -> StorageResult<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, status FROM channels WHERE canonical_id = ?1",
                params![record.canonical_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((row_id, status)) = existing else {
            return Ok(false);
        };
        let current = ChannelStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Database(format!("Unknown status '{}'", status)))?;
        if !matches!(current, ChannelStatus::Discovered | ChannelStatus::Rejected) {
            return Ok(false);
        }

        Self::write_row(&tx, row_id, record)?;
        tx.commit()?;
        Ok(true)
    }

    fn mark_crawl_result(
        &mut self,
        canonical_id: &str,
        status: ChannelStatus,
        notes: Option<&str>,
        attempted_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM channels WHERE canonical_id = ?1",
                params![canonical_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| StorageError::ChannelNotFound(canonical_id.to_string()))?;
        let current = ChannelStatus::from_db_string(&current)
            .ok_or_else(|| StorageError::Database(format!("Unknown status '{}'", current)))?;

        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        tx.execute(
            "UPDATE channels SET status = ?1, notes = COALESCE(?2, notes),
             last_crawl_attempt_at = COALESCE(?3, last_crawl_attempt_at)
             WHERE canonical_id = ?4",
            params![
                status.to_db_string(),
                notes.map(truncate_notes),
                attempted_at.as_ref().map(format_ts),
                canonical_id
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn reset_failed(&mut self, canonical_id: &str) -> StorageResult<()> {
        let current = self.current_status(canonical_id)?;
        if current != ChannelStatus::Failed {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: ChannelStatus::Discovered,
            });
        }

        // The status guard keeps a concurrent writer from being overwritten
        let changed = self.conn.execute(
            "UPDATE channels SET status = ?1, notes = NULL, last_crawl_attempt_at = NULL
             WHERE canonical_id = ?2 AND status = ?3",
            params![
                ChannelStatus::Discovered.to_db_string(),
                canonical_id,
                ChannelStatus::Failed.to_db_string()
            ],
        )?;

        if changed == 0 {
            let now = self.current_status(canonical_id)?;
            return Err(StorageError::InvalidTransition {
                from: now,
                to: ChannelStatus::Discovered,
            });
        }
        Ok(())
    }

    // ===== Config KV =====

    fn get_config(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_config(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    // ===== Crawl Budget =====

    fn increment_today_budget_if_under(
        &mut self,
        today: NaiveDate,
        max: u32,
    ) -> StorageResult<bool> {
        let day = format_day(today);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO crawl_budget (day, joins) VALUES (?1, 0)",
            params![day],
        )?;
        let changed = tx.execute(
            "UPDATE crawl_budget SET joins = joins + 1 WHERE day = ?1 AND joins < ?2",
            params![day, max],
        )?;

        tx.commit()?;
        Ok(changed == 1)
    }

    fn release_today_budget(&mut self, today: NaiveDate) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_budget SET joins = MAX(joins - 1, 0) WHERE day = ?1",
            params![format_day(today)],
        )?;
        Ok(())
    }

    fn joins_on(&self, day: NaiveDate) -> StorageResult<u32> {
        let joins: Option<u32> = self
            .conn
            .query_row(
                "SELECT joins FROM crawl_budget WHERE day = ?1",
                params![format_day(day)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(joins.unwrap_or(0))
    }

    // ===== Statistics =====

    fn count_by_status(&self) -> StorageResult<HashMap<ChannelStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM channels GROUP BY status")?;

        let mut counts: HashMap<ChannelStatus, u64> = ChannelStatus::all_states()
            .into_iter()
            .map(|s| (s, 0))
            .collect();

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = ChannelStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    fn count_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM channels WHERE category IS NOT NULL
             GROUP BY category ORDER BY COUNT(*) DESC, category ASC",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so they order as text
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_ts(idx, &raw)).transpose()
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    let status: String = row.get(6)?;
    let status = ChannelStatus::from_db_string(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            format!("unknown status '{}'", status).into(),
        )
    })?;

    Ok(ChannelRecord {
        canonical_id: row.get(0)?,
        handle: row.get(1)?,
        kind: ChannelKind::from_db_string(&row.get::<_, String>(2)?),
        title: row.get(3)?,
        member_count: row.get(4)?,
        category: row
            .get::<_, Option<String>>(5)?
            .and_then(|c| Category::from_db_string(&c)),
        status,
        discovered_from: row.get(7)?,
        notes: row.get(8)?,
        discovered_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        last_verified_at: parse_optional_ts(10, row.get(10)?)?,
        last_crawl_attempt_at: parse_optional_ts(11, row.get(11)?)?,
    })
}

fn constraint_error(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(msg.unwrap_or_else(|| e.to_string()))
        }
        other => StorageError::Sqlite(other),
    }
}
