//! Error types for the Cadence engine.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Habit {habit_id} already completed on {date}")]
    DuplicateEvent { habit_id: i64, date: NaiveDate },

    #[error("Not found: {0}")]
    Referential(String),

    #[error("Upstream directory unavailable: {0}")]
    UpstreamUnavailable(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
