//! Streak derivation and persistence.
//!
//! Streaks are recomputed from the habit's full completion-date list on
//! every write rather than maintained incrementally; the stored longest
//! streak is folded into each recompute so a prior best is never erased
//! by a reset.

use crate::db::{self, parse_date};
use crate::{EventStore, Result};
use cadence_types::{HabitStreaks, StreakRecord};
use chrono::{Duration, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Result of a streak recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakOutcome {
    pub current: u32,
    pub longest: u32,
}

/// Derive current/longest streak from completion dates in descending
/// order.
///
/// The walk anchors at min(most recent date, today), so future-dated
/// entries can't inflate the run. A most-recent completion before
/// yesterday breaks the streak outright. During the walk, a date equal
/// to the expected day extends the run, an earlier date is a gap, and a
/// later date is skipped (already counted). The returned longest is
/// never below `stored_longest`.
pub fn compute_streak(
    dates_desc: &[NaiveDate],
    today: NaiveDate,
    stored_longest: u32,
) -> StreakOutcome {
    let Some(&most_recent) = dates_desc.first() else {
        return StreakOutcome {
            current: 0,
            longest: stored_longest,
        };
    };

    let anchor = most_recent.min(today);
    let gap = (today - anchor).num_days();

    let mut current = 0u32;
    let mut walk_longest = 0u32;
    if gap <= 1 {
        let mut expected = anchor;
        for &date in dates_desc {
            if date == expected {
                current += 1;
                walk_longest = walk_longest.max(current);
                expected -= Duration::days(1);
            } else if date < expected {
                break;
            }
        }
    }

    StreakOutcome {
        current,
        longest: walk_longest.max(current).max(stored_longest),
    }
}

/// SQLite persistence for per-habit streak records.
pub struct StreakStore {
    conn: Mutex<Connection>,
}

impl StreakStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The stored record, or the zero record when none exists.
    pub fn get(&self, habit_id: i64, user_id: i64) -> Result<StreakRecord> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT habit_id, user_id, current_streak, longest_streak, last_completion_date \
                 FROM habit_streaks WHERE habit_id = ?1 AND user_id = ?2",
                params![habit_id, user_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record.unwrap_or_else(|| StreakRecord::zero(habit_id, user_id)))
    }

    /// Lazily create the zero record. Called on habit creation.
    pub fn ensure(&self, habit_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO habit_streaks \
             (habit_id, user_id, current_streak, longest_streak, last_completion_date, updated_at) \
             VALUES (?1, ?2, 0, 0, NULL, ?3)",
            params![habit_id, user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Atomic insert-or-update keyed by (habit_id, user_id). This is the
    /// serialization point for concurrent updates to the same habit.
    pub fn upsert(&self, record: &StreakRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO habit_streaks
                (habit_id, user_id, current_streak, longest_streak, last_completion_date, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (habit_id, user_id) DO UPDATE SET
                current_streak = ?3,
                longest_streak = ?4,
                last_completion_date = ?5,
                updated_at = ?6
            "#,
            params![
                record.habit_id,
                record.user_id,
                record.current_streak,
                record.longest_streak,
                record.last_completion_date.map(|d| d.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// MAX(current_streak) across the user's records. Rollup input.
    pub fn best_current(&self, user_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let best: Option<i64> = conn.query_row(
            "SELECT MAX(current_streak) FROM habit_streaks WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(best.unwrap_or(0) as u32)
    }

    /// Number of tracked streak records for the user.
    pub fn count(&self, user_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM habit_streaks WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    /// Best current streak among active habits, with the habit title.
    pub fn best_current_with_title(&self, user_id: i64) -> Result<Option<(u32, String)>> {
        self.best_with_title(
            user_id,
            "ORDER BY hs.current_streak DESC, hs.longest_streak DESC",
            "hs.current_streak",
        )
    }

    /// Best longest streak among active habits, with the habit title.
    pub fn best_longest_with_title(&self, user_id: i64) -> Result<Option<(u32, String)>> {
        self.best_with_title(
            user_id,
            "ORDER BY hs.longest_streak DESC, hs.current_streak DESC",
            "hs.longest_streak",
        )
    }

    fn best_with_title(
        &self,
        user_id: i64,
        order: &str,
        column: &str,
    ) -> Result<Option<(u32, String)>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {column}, h.title FROM habit_streaks hs \
             INNER JOIN habits h ON hs.habit_id = h.id AND hs.user_id = h.user_id \
             WHERE hs.user_id = ?1 AND h.is_active = 1 {order} LIMIT 1"
        );
        let best = conn
            .query_row(&sql, params![user_id], |row| {
                Ok((row.get::<_, i64>(0)? as u32, row.get::<_, String>(1)?))
            })
            .optional()?;
        Ok(best)
    }

    /// Active habits joined with their streak standing, best first:
    /// longest streak desc, then current streak desc, then title asc.
    pub fn habits_with_streaks(&self, user_id: i64) -> Result<Vec<HabitStreaks>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT h.id, h.title, \
                    COALESCE(hs.current_streak, 0) AS current_streak, \
                    COALESCE(hs.longest_streak, 0) AS longest_streak \
             FROM habits h \
             LEFT JOIN habit_streaks hs ON h.id = hs.habit_id AND h.user_id = hs.user_id \
             WHERE h.user_id = ?1 AND h.is_active = 1 \
             ORDER BY COALESCE(hs.longest_streak, 0) DESC, \
                      COALESCE(hs.current_streak, 0) DESC, \
                      h.title ASC",
        )?;
        let habits = stmt
            .query_map(params![user_id], |row| {
                Ok(HabitStreaks {
                    habit_id: row.get(0)?,
                    title: row.get(1)?,
                    current_streak: row.get::<_, i64>(2)? as u32,
                    longest_streak: row.get::<_, i64>(3)? as u32,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StreakRecord> {
        let last: Option<String> = row.get("last_completion_date")?;
        Ok(StreakRecord {
            habit_id: row.get("habit_id")?,
            user_id: row.get("user_id")?,
            current_streak: row.get::<_, i64>("current_streak")? as u32,
            longest_streak: row.get::<_, i64>("longest_streak")? as u32,
            last_completion_date: last.map(parse_date).transpose()?,
        })
    }
}

/// Recomputes and persists a habit's streak after every event append.
pub struct StreakTracker {
    events: Arc<EventStore>,
    streaks: Arc<StreakStore>,
}

impl StreakTracker {
    pub fn new(events: Arc<EventStore>, streaks: Arc<StreakStore>) -> Self {
        Self { events, streaks }
    }

    /// Recompute the habit's streak against the caller's clock and
    /// persist it.
    pub fn update(&self, habit_id: i64, user_id: i64) -> Result<StreakRecord> {
        self.update_as_of(habit_id, user_id, Local::now().date_naive())
    }

    pub fn update_as_of(
        &self,
        habit_id: i64,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<StreakRecord> {
        let dates = self.events.dates_for_habit(habit_id, user_id)?;
        let stored = self.streaks.get(habit_id, user_id)?;
        let outcome = compute_streak(&dates, today, stored.longest_streak);
        let record = StreakRecord {
            habit_id,
            user_id,
            current_streak: outcome.current,
            longest_streak: outcome.longest,
            last_completion_date: dates.first().copied(),
        };
        self.streaks.upsert(&record)?;
        tracing::debug!(
            target: "cadence::streak",
            "habit {habit_id}: current {} longest {}",
            record.current_streak,
            record.longest_streak
        );
        Ok(record)
    }
}
