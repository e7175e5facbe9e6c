//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the channel catalog.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per canonical channel identity
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_id TEXT NOT NULL UNIQUE,
    handle TEXT UNIQUE COLLATE NOCASE,
    kind TEXT NOT NULL DEFAULT 'unknown',
    title TEXT,
    member_count INTEGER,
    category TEXT,
    status TEXT NOT NULL,
    discovered_from TEXT,
    notes TEXT,
    discovered_at TEXT NOT NULL,
    last_verified_at TEXT,
    last_crawl_attempt_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_channels_status ON channels(status, discovered_at);
CREATE INDEX IF NOT EXISTS idx_channels_category ON channels(category);

-- Joins performed per calendar day
CREATE TABLE IF NOT EXISTS crawl_budget (
    day TEXT PRIMARY KEY,
    joins INTEGER NOT NULL DEFAULT 0 CHECK (joins >= 0)
);

-- Small mutable runtime flags
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
