//! Rollup computation and its cache.
//!
//! Week and month rollups are cached rows, authoritative until the next
//! refresh (no TTL). Day rollups are cheap enough to compute on every
//! read and are never persisted.

use crate::db;
use crate::{DirectoryStore, EventStore, Result, StreakStore};
use cadence_types::{PeriodKey, PeriodKind, PeriodRollup};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite persistence for weekly and monthly rollup rows.
pub struct RollupStore {
    conn: Mutex<Connection>,
}

impl RollupStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The cached row for the exact key, if any. Day keys are never
    /// cached.
    pub fn get(&self, user_id: i64, key: &PeriodKey) -> Result<Option<PeriodRollup>> {
        let Some((table, key_column)) = Self::table_for(key.kind()) else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT total_habits, total_eligible, completed_count, completed_days, \
                    completion_percentage, best_streak \
             FROM {table} WHERE user_id = ?1 AND {key_column} = ?2"
        );
        let rollup = conn
            .query_row(&sql, params![user_id, key.to_string()], |row| {
                Ok(PeriodRollup {
                    user_id,
                    period_kind: key.kind(),
                    period_key: key.to_string(),
                    total_habits: row.get::<_, i64>(0)? as u32,
                    total_eligible: row.get::<_, i64>(1)? as u32,
                    completed_count: row.get::<_, i64>(2)? as u32,
                    completed_days: row.get::<_, i64>(3)? as u32,
                    completion_percentage: row.get(4)?,
                    best_streak_in_period: row.get::<_, i64>(5)? as u32,
                })
            })
            .optional()?;
        Ok(rollup)
    }

    /// Atomic insert-or-update keyed by (user_id, period key). Concurrent
    /// recomputes of the same period converge; last write wins.
    pub fn upsert(&self, rollup: &PeriodRollup) -> Result<()> {
        let Some((table, key_column)) = Self::table_for(rollup.period_kind) else {
            return Ok(());
        };
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            r#"
            INSERT INTO {table}
                (user_id, {key_column}, total_habits, total_eligible, completed_count,
                 completed_days, completion_percentage, best_streak, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (user_id, {key_column}) DO UPDATE SET
                total_habits = ?3,
                total_eligible = ?4,
                completed_count = ?5,
                completed_days = ?6,
                completion_percentage = ?7,
                best_streak = ?8,
                updated_at = ?9
            "#
        );
        conn.execute(
            &sql,
            params![
                rollup.user_id,
                rollup.period_key,
                rollup.total_habits,
                rollup.total_eligible,
                rollup.completed_count,
                rollup.completed_days,
                rollup.completion_percentage,
                rollup.best_streak_in_period,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn table_for(kind: PeriodKind) -> Option<(&'static str, &'static str)> {
        match kind {
            PeriodKind::Day => None,
            PeriodKind::Week => Some(("weekly_rollups", "week_start")),
            PeriodKind::Month => Some(("monthly_rollups", "month_key")),
        }
    }
}

/// Computes per-user period rollups, cache first.
pub struct RollupCalculator {
    events: Arc<EventStore>,
    streaks: Arc<StreakStore>,
    directory: Arc<DirectoryStore>,
    cache: Arc<RollupStore>,
}

impl RollupCalculator {
    pub fn new(
        events: Arc<EventStore>,
        streaks: Arc<StreakStore>,
        directory: Arc<DirectoryStore>,
        cache: Arc<RollupStore>,
    ) -> Self {
        Self {
            events,
            streaks,
            directory,
            cache,
        }
    }

    /// Cached row if one exists, fresh computation otherwise. A computed
    /// week/month rollup is persisted; a cache-write failure is logged
    /// and the computed value still returned. A user with no active
    /// habits gets a zero rollup that is never persisted.
    pub fn get_or_compute(&self, user_id: i64, key: PeriodKey) -> Result<PeriodRollup> {
        if let Some(cached) = self.cache.get(user_id, &key)? {
            return Ok(cached);
        }
        let rollup = self.compute(user_id, key)?;
        if rollup.total_habits > 0 {
            if let Err(err) = self.cache.upsert(&rollup) {
                tracing::warn!(
                    target: "cadence::rollup",
                    "failed to cache {} rollup for user {user_id}: {err}",
                    rollup.period_key
                );
            }
        }
        Ok(rollup)
    }

    /// Recompute and upsert unconditionally, replacing any stale cached
    /// row. The orchestrator path.
    pub fn refresh(&self, user_id: i64, key: PeriodKey) -> Result<PeriodRollup> {
        let rollup = self.compute(user_id, key)?;
        if rollup.total_habits > 0 {
            self.cache.upsert(&rollup)?;
        }
        Ok(rollup)
    }

    fn compute(&self, user_id: i64, key: PeriodKey) -> Result<PeriodRollup> {
        let total_habits = self.directory.count_active_habits(user_id)?;
        if total_habits == 0 {
            return Ok(PeriodRollup::empty(user_id, key));
        }

        let window = key.window();
        let completed_count = match key.kind() {
            // One habit counts once per day; distinct keeps the numerator
            // within the single-habit eligibility.
            PeriodKind::Day => self.events.count_habits_completed_on(user_id, window.start)?,
            PeriodKind::Week | PeriodKind::Month => {
                self.events
                    .count_in_range(user_id, window.start, window.end)?
            }
        };
        let completed_days =
            self.events
                .count_distinct_dates(user_id, window.start, window.end, true)?;
        let total_eligible = total_habits * window.days;

        Ok(PeriodRollup {
            user_id,
            period_kind: key.kind(),
            period_key: key.to_string(),
            total_habits,
            total_eligible,
            completed_count,
            completed_days,
            completion_percentage: percentage(completed_count, total_eligible),
            best_streak_in_period: self.streaks.best_current(user_id)?,
        })
    }
}

/// `completed / eligible` as a percentage with two-decimal rounding;
/// zero when nothing is eligible.
pub(crate) fn percentage(completed: u32, eligible: u32) -> f64 {
    if eligible == 0 {
        return 0.0;
    }
    (f64::from(completed) / f64::from(eligible) * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreakTracker;
    use cadence_types::{NewCompletion, NewHabit, NewUser};
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        events: Arc<EventStore>,
        streaks: Arc<StreakStore>,
        directory: Arc<DirectoryStore>,
        cache: Arc<RollupStore>,
        calculator: RollupCalculator,
        user: i64,
        habits: Vec<i64>,
    }

    fn setup(habit_count: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cadence.db");
        let events = Arc::new(EventStore::open(&path).unwrap());
        let streaks = Arc::new(StreakStore::open(&path).unwrap());
        let directory = Arc::new(DirectoryStore::open(&path).unwrap());
        let cache = Arc::new(RollupStore::open(&path).unwrap());
        let calculator = RollupCalculator::new(
            events.clone(),
            streaks.clone(),
            directory.clone(),
            cache.clone(),
        );
        let user = directory
            .create_user(&NewUser {
                username: "ada".into(),
            })
            .unwrap()
            .id;
        let habits = (0..habit_count)
            .map(|i| {
                let habit = directory
                    .create_habit(&NewHabit {
                        user_id: user,
                        title: format!("habit-{i}"),
                        description: None,
                    })
                    .unwrap();
                streaks.ensure(habit.id, user).unwrap();
                habit.id
            })
            .collect();
        Fixture {
            _dir: dir,
            events,
            streaks,
            directory,
            cache,
            calculator,
            user,
            habits,
        }
    }

    fn append(fx: &Fixture, habit: i64, on: NaiveDate) {
        fx.events
            .append(&NewCompletion {
                habit_id: habit,
                user_id: fx.user,
                completion_date: on,
                notes: None,
            })
            .unwrap();
    }

    #[test]
    fn test_weekly_rollup_two_habits_ten_completions() {
        let fx = setup(2);
        let week = PeriodKey::Week(date(2024, 1, 1));
        // 10 completions across the week: habit 0 all 7 days, habit 1 on 3.
        for d in 1..=7 {
            append(&fx, fx.habits[0], date(2024, 1, d));
        }
        for d in 1..=3 {
            append(&fx, fx.habits[1], date(2024, 1, d));
        }

        let rollup = fx.calculator.get_or_compute(fx.user, week).unwrap();
        assert_eq!(rollup.total_habits, 2);
        assert_eq!(rollup.total_eligible, 14);
        assert_eq!(rollup.completed_count, 10);
        assert_eq!(rollup.completed_days, 7);
        assert_eq!(rollup.completion_percentage, 71.43);
    }

    #[test]
    fn test_zero_active_habits_returns_empty_and_skips_cache() {
        let fx = setup(0);
        let week = PeriodKey::Week(date(2024, 1, 1));
        let rollup = fx.calculator.get_or_compute(fx.user, week).unwrap();
        assert_eq!(rollup, PeriodRollup::empty(fx.user, week));
        assert!(fx.cache.get(fx.user, &week).unwrap().is_none());
    }

    #[test]
    fn test_cache_is_authoritative_until_refresh() {
        let fx = setup(1);
        let week = PeriodKey::Week(date(2024, 1, 1));
        append(&fx, fx.habits[0], date(2024, 1, 1));
        let first = fx.calculator.get_or_compute(fx.user, week).unwrap();
        assert_eq!(first.completed_count, 1);

        // New events don't show up until something refreshes the row.
        append(&fx, fx.habits[0], date(2024, 1, 2));
        let stale = fx.calculator.get_or_compute(fx.user, week).unwrap();
        assert_eq!(stale.completed_count, 1);

        let fresh = fx.calculator.refresh(fx.user, week).unwrap();
        assert_eq!(fresh.completed_count, 2);
        let cached = fx.cache.get(fx.user, &week).unwrap().unwrap();
        assert_eq!(cached, fresh);
    }

    #[test]
    fn test_daily_rollup_counts_distinct_habits_and_is_ephemeral() {
        let fx = setup(2);
        let day = date(2024, 1, 1);
        append(&fx, fx.habits[0], day);
        append(&fx, fx.habits[1], day);

        let rollup = fx
            .calculator
            .get_or_compute(fx.user, PeriodKey::Day(day))
            .unwrap();
        assert_eq!(rollup.total_eligible, 2);
        assert_eq!(rollup.completed_count, 2);
        assert_eq!(rollup.completion_percentage, 100.0);
        assert!(fx.cache.get(fx.user, &PeriodKey::Day(day)).unwrap().is_none());
    }

    #[test]
    fn test_monthly_rollup_uses_days_in_month() {
        let fx = setup(1);
        let key = PeriodKey::Month {
            year: 2024,
            month: 2,
        };
        for d in 1..=10 {
            append(&fx, fx.habits[0], date(2024, 2, d));
        }
        let rollup = fx.calculator.get_or_compute(fx.user, key).unwrap();
        // February 2024 has 29 days.
        assert_eq!(rollup.total_eligible, 29);
        assert_eq!(rollup.completed_count, 10);
        assert_eq!(rollup.completion_percentage, 34.48);
        assert_eq!(rollup.completed_days, 10);
    }

    #[test]
    fn test_rollup_carries_best_current_streak() {
        let fx = setup(2);
        let tracker = StreakTracker::new(fx.events.clone(), fx.streaks.clone());
        let today = date(2024, 1, 7);
        for d in 5..=7 {
            append(&fx, fx.habits[0], date(2024, 1, d));
        }
        tracker.update_as_of(fx.habits[0], fx.user, today).unwrap();

        let rollup = fx
            .calculator
            .get_or_compute(fx.user, PeriodKey::Week(date(2024, 1, 1)))
            .unwrap();
        assert_eq!(rollup.best_streak_in_period, 3);
    }

    #[test]
    fn test_mid_period_habit_keeps_percentage_bounded() {
        // A habit created mid-week is eligible for the full 7 days; the
        // denominator never shrinks to inflate the percentage.
        let fx = setup(1);
        let week = PeriodKey::Week(date(2024, 1, 1));
        for d in 5..=7 {
            append(&fx, fx.habits[0], date(2024, 1, d));
        }
        let rollup = fx.calculator.get_or_compute(fx.user, week).unwrap();
        assert_eq!(rollup.total_eligible, 7);
        assert_eq!(rollup.completion_percentage, 42.86);
        assert!(rollup.completion_percentage <= 100.0);
    }

    #[test]
    fn test_inactive_habits_drop_out_of_denominator_and_numerator() {
        let fx = setup(2);
        let week = PeriodKey::Week(date(2024, 1, 1));
        append(&fx, fx.habits[0], date(2024, 1, 1));
        append(&fx, fx.habits[1], date(2024, 1, 1));
        fx.directory.deactivate_habit(fx.habits[1], fx.user).unwrap();

        let rollup = fx.calculator.refresh(fx.user, week).unwrap();
        assert_eq!(rollup.total_habits, 1);
        assert_eq!(rollup.total_eligible, 7);
        assert_eq!(rollup.completed_count, 1);
    }

    proptest! {
        /// Rounded percentages stay within [0, 100] whenever the
        /// numerator is bounded by eligibility.
        #[test]
        fn prop_percentage_bounded(eligible in 0u32..10_000, completed_frac in 0.0f64..=1.0) {
            let completed = (f64::from(eligible) * completed_frac).floor() as u32;
            let pct = percentage(completed, eligible);
            prop_assert!((0.0..=100.0).contains(&pct));
            // Two-decimal rounding.
            prop_assert!((pct * 100.0 - (pct * 100.0).round()).abs() < 1e-9);
        }
    }
}
