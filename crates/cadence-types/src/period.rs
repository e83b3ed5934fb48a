//! Rollup periods: keys, window math, and the cached aggregate row.

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static MONTH_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").unwrap());

/// The three rollup granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Day,
    Week,
    Month,
}

/// Identifies one rollup row of a given kind: a date, a week-start date,
/// or a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKey {
    Day(NaiveDate),
    /// First day of a 7-day window.
    Week(NaiveDate),
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    pub fn kind(&self) -> PeriodKind {
        match self {
            PeriodKey::Day(_) => PeriodKind::Day,
            PeriodKey::Week(_) => PeriodKind::Week,
            PeriodKey::Month { .. } => PeriodKind::Month,
        }
    }

    /// Parse a `"YYYY-MM"` month key. The month component must be 01-12.
    pub fn month_from_str(key: &str) -> Option<Self> {
        if !MONTH_KEY_RE.is_match(key) {
            return None;
        }
        let (year, month) = key.split_once('-')?;
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        // Rejects e.g. "2024-13"; the regex only checks the shape.
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(PeriodKey::Month { year, month })
    }

    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        PeriodKey::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The Monday-started ISO week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        PeriodKey::Week(week_start(date))
    }

    /// The inclusive calendar window this key covers.
    pub fn window(&self) -> PeriodWindow {
        match *self {
            PeriodKey::Day(date) => PeriodWindow {
                start: date,
                end: date,
                days: 1,
            },
            PeriodKey::Week(start) => PeriodWindow {
                start,
                end: start + Duration::days(6),
                days: 7,
            },
            PeriodKey::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)
                    .expect("month key validated on construction");
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .expect("month key validated on construction");
                let end = next - Duration::days(1);
                PeriodWindow {
                    start,
                    end,
                    days: (next - start).num_days() as u32,
                }
            }
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PeriodKey::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PeriodKey::Week(start) => write!(f, "{}", start.format("%Y-%m-%d")),
            PeriodKey::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Inclusive date window of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
}

/// A cached aggregate for one user over one period.
///
/// Always reconstructable from the completion log and the active-habit
/// set; may be stale between recalculation triggers but the percentage is
/// always within 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRollup {
    pub user_id: i64,
    pub period_kind: PeriodKind,
    /// Rendered key: a date, a week-start date, or `"YYYY-MM"`.
    pub period_key: String,
    pub total_habits: u32,
    /// habit count x days in the period.
    pub total_eligible: u32,
    pub completed_count: u32,
    /// Distinct calendar dates with at least one completion in the window.
    pub completed_days: u32,
    /// 0-100, rounded to two decimals.
    pub completion_percentage: f64,
    pub best_streak_in_period: u32,
}

impl PeriodRollup {
    /// The rollup for a user with no active habits. Never persisted.
    pub fn empty(user_id: i64, key: PeriodKey) -> Self {
        Self {
            user_id,
            period_kind: key.kind(),
            period_key: key.to_string(),
            total_habits: 0,
            total_eligible: 0,
            completed_count: 0,
            completed_days: 0,
            completion_percentage: 0.0,
            best_streak_in_period: 0,
        }
    }
}

/// Cross-period standing for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOverview {
    pub total_habits: u32,
    pub active_habits: u32,
    pub completed_today: u32,
    pub today_completion_percentage: f64,
    pub tracked_streaks: u32,
    pub best_current_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_current_streak_habit: Option<String>,
    pub best_longest_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_longest_streak_habit: Option<String>,
    pub total_completions: u32,
}
