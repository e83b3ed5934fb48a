//! Shared SQLite schema.
//!
//! All stores share one database file; each opens its own connection
//! here. Schema creation is idempotent, so opening order does not matter
//! even though some queries join across tables owned by different stores.

use crate::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS habits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id, is_active);

CREATE TABLE IF NOT EXISTS completion_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    habit_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    completion_date TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (habit_id, completion_date)
);

CREATE INDEX IF NOT EXISTS idx_completions_user_date
    ON completion_events(user_id, completion_date);

CREATE TABLE IF NOT EXISTS habit_streaks (
    habit_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_completion_date TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (habit_id, user_id)
);

CREATE TABLE IF NOT EXISTS weekly_rollups (
    user_id INTEGER NOT NULL,
    week_start TEXT NOT NULL,
    total_habits INTEGER NOT NULL,
    total_eligible INTEGER NOT NULL,
    completed_count INTEGER NOT NULL,
    completed_days INTEGER NOT NULL,
    completion_percentage REAL NOT NULL,
    best_streak INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, week_start)
);

CREATE TABLE IF NOT EXISTS monthly_rollups (
    user_id INTEGER NOT NULL,
    month_key TEXT NOT NULL,
    total_habits INTEGER NOT NULL,
    total_eligible INTEGER NOT NULL,
    completed_count INTEGER NOT NULL,
    completed_days INTEGER NOT NULL,
    completion_percentage REAL NOT NULL,
    best_streak INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, month_key)
);
"#;

/// Open a connection to the shared database, creating the schema if
/// needed. WAL mode so concurrent connections (request handlers plus the
/// spawned recalculation task) don't starve each other.
pub(crate) fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Parse a stored `YYYY-MM-DD` column value.
pub(crate) fn parse_date(value: String) -> rusqlite::Result<NaiveDate> {
    value.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
