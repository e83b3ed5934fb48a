//! Completion events and their query filters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of a habit being completed on a calendar day.
///
/// Unique per `(habit_id, completion_date)`; the event store rejects a
/// second completion for the same habit and date instead of overwriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub id: i64,
    pub habit_id: i64,
    pub user_id: i64,
    /// Calendar day, no time component.
    pub completion_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a completion. The store assigns id and timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCompletion {
    pub habit_id: i64,
    pub user_id: i64,
    pub completion_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Filter for listing completions. Only the user is required; the date
/// bounds are inclusive and independent.
#[derive(Debug, Clone)]
pub struct CompletionFilter {
    pub user_id: i64,
    pub habit_id: Option<i64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl CompletionFilter {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id,
            habit_id: None,
            start: None,
            end: None,
        }
    }

    /// Completions on exactly one day.
    pub fn on_date(user_id: i64, date: NaiveDate) -> Self {
        Self {
            user_id,
            habit_id: None,
            start: Some(date),
            end: Some(date),
        }
    }
}
