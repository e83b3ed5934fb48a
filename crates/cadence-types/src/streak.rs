//! Per-habit streak records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current and best consecutive-day runs for one habit.
///
/// `longest_streak` never decreases over the lifetime of a habit, even
/// when `current_streak` resets to zero after a missed day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub habit_id: i64,
    pub user_id: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completion_date: Option<NaiveDate>,
}

impl StreakRecord {
    /// The record a habit starts with (and the default when none is stored).
    pub fn zero(habit_id: i64, user_id: i64) -> Self {
        Self {
            habit_id,
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_completion_date: None,
        }
    }
}

/// A habit joined with its streak standing, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStreaks {
    pub habit_id: i64,
    pub title: String,
    pub current_streak: u32,
    pub longest_streak: u32,
}
