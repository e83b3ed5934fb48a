//! SQLite persistence for the append-only completion event log.

use crate::db::{self, is_unique_violation, parse_date};
use crate::{CadenceError, Result};
use cadence_types::{CompletionEvent, CompletionFilter, NewCompletion};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use std::path::Path;
use std::sync::Mutex;

/// Append-only store of completion events.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a completion event. A second completion for the same habit
    /// and date fails with [`CadenceError::DuplicateEvent`]; nothing is
    /// overwritten.
    pub fn append(&self, new: &NewCompletion) -> Result<CompletionEvent> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        let inserted = conn.execute(
            r#"
            INSERT INTO completion_events (habit_id, user_id, completion_date, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                new.habit_id,
                new.user_id,
                new.completion_date.to_string(),
                new.notes,
                created_at.to_rfc3339(),
            ],
        );
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(CadenceError::DuplicateEvent {
                    habit_id: new.habit_id,
                    date: new.completion_date,
                });
            }
            return Err(err.into());
        }
        Ok(CompletionEvent {
            id: conn.last_insert_rowid(),
            habit_id: new.habit_id,
            user_id: new.user_id,
            completion_date: new.completion_date,
            notes: new.notes.clone(),
            created_at,
        })
    }

    /// List events matching all supplied filters, most recent date first.
    pub fn list(&self, filter: &CompletionFilter) -> Result<Vec<CompletionEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, habit_id, user_id, completion_date, notes, created_at \
             FROM completion_events WHERE user_id = ?1",
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(filter.user_id)];
        if let Some(habit_id) = filter.habit_id {
            values.push(Box::new(habit_id));
            sql.push_str(&format!(" AND habit_id = ?{}", values.len()));
        }
        if let Some(start) = filter.start {
            values.push(Box::new(start.to_string()));
            sql.push_str(&format!(" AND completion_date >= ?{}", values.len()));
        }
        if let Some(end) = filter.end {
            values.push(Box::new(end.to_string()));
            sql.push_str(&format!(" AND completion_date <= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY completion_date DESC");

        let value_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(value_refs), Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// All completion dates for one habit, descending. Streak recompute
    /// input.
    pub fn dates_for_habit(&self, habit_id: i64, user_id: i64) -> Result<Vec<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT completion_date FROM completion_events \
             WHERE habit_id = ?1 AND user_id = ?2 \
             ORDER BY completion_date DESC",
        )?;
        let dates = stmt
            .query_map(params![habit_id, user_id], |row| {
                parse_date(row.get::<_, String>(0)?)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    /// Distinct calendar dates with at least one completion in the
    /// inclusive range. With `active_only`, completions on inactive
    /// habits don't count.
    pub fn count_distinct_dates(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        active_only: bool,
    ) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let sql = if active_only {
            "SELECT COUNT(DISTINCT ce.completion_date) FROM completion_events ce \
             INNER JOIN habits h ON ce.habit_id = h.id AND ce.user_id = h.user_id \
             WHERE ce.user_id = ?1 AND ce.completion_date >= ?2 AND ce.completion_date <= ?3 \
               AND h.is_active = 1"
        } else {
            "SELECT COUNT(DISTINCT completion_date) FROM completion_events \
             WHERE user_id = ?1 AND completion_date >= ?2 AND completion_date <= ?3"
        };
        let count = conn.query_row(
            sql,
            params![user_id, start.to_string(), end.to_string()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    /// Completions on active habits inside the inclusive range. Week and
    /// month rollup numerator.
    pub fn count_in_range(&self, user_id: i64, start: NaiveDate, end: NaiveDate) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM completion_events ce \
             INNER JOIN habits h ON ce.habit_id = h.id AND ce.user_id = h.user_id \
             WHERE ce.user_id = ?1 AND ce.completion_date >= ?2 AND ce.completion_date <= ?3 \
               AND h.is_active = 1",
            params![user_id, start.to_string(), end.to_string()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    /// Distinct active habits completed on one date. Daily rollup
    /// numerator; counting active habits only keeps the percentage
    /// within 100.
    pub fn count_habits_completed_on(&self, user_id: i64, date: NaiveDate) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(DISTINCT ce.habit_id) FROM completion_events ce \
             INNER JOIN habits h ON ce.habit_id = h.id AND ce.user_id = h.user_id \
             WHERE ce.user_id = ?1 AND ce.completion_date = ?2 AND h.is_active = 1",
            params![user_id, date.to_string()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    /// Lifetime completion count across all habits, active or not.
    pub fn count_all(&self, user_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM completion_events WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<CompletionEvent> {
        let completion_date = parse_date(row.get::<_, String>("completion_date")?)?;
        let created_at: String = row.get("created_at")?;
        Ok(CompletionEvent {
            id: row.get("id")?,
            habit_id: row.get("habit_id")?,
            user_id: row.get("user_id")?,
            completion_date,
            notes: row.get("notes")?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_default(),
        })
    }
}
