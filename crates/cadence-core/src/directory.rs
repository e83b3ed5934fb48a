//! Habit and user directory: the local authority for referential checks,
//! plus optional resolution against a remote upstream.
//!
//! An append is only accepted for an existing user and an active habit
//! they own. When a remote directory service is configured it is asked
//! first, under a short timeout; a timeout or transport failure means
//! "unknown" and the local tables answer instead. An unverifiable claim
//! is never trusted: the caller rejects it as not-found.

use crate::db::{self, is_unique_violation};
use crate::{CadenceError, Result};
use async_trait::async_trait;
use cadence_types::{Habit, HabitUpdate, NewHabit, NewUser, User};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQLite-backed habit/user directory.
pub struct DirectoryStore {
    conn: Mutex<Connection>,
}

impl DirectoryStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
            params![new.username, created_at.to_rfc3339()],
        );
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(CadenceError::Validation(format!(
                    "username {:?} is already taken",
                    new.username
                )));
            }
            return Err(err.into());
        }
        Ok(User {
            id: conn.last_insert_rowid(),
            username: new.username.clone(),
            created_at,
        })
    }

    pub fn user_exists(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn create_habit(&self, new: &NewHabit) -> Result<Habit> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO habits (user_id, title, description, is_active, created_at) \
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![
                new.user_id,
                new.title,
                new.description,
                created_at.to_rfc3339()
            ],
        )?;
        Ok(Habit {
            id: conn.last_insert_rowid(),
            user_id: new.user_id,
            title: new.title.clone(),
            description: new.description.clone(),
            is_active: true,
            created_at,
        })
    }

    pub fn get_habit(&self, habit_id: i64, user_id: i64) -> Result<Option<Habit>> {
        let conn = self.conn.lock().unwrap();
        let habit = conn
            .query_row(
                "SELECT id, user_id, title, description, is_active, created_at \
                 FROM habits WHERE id = ?1 AND user_id = ?2",
                params![habit_id, user_id],
                Self::row_to_habit,
            )
            .optional()?;
        Ok(habit)
    }

    /// A user's habits, newest first. Inactive habits only when asked for.
    pub fn list_habits(&self, user_id: i64, include_inactive: bool) -> Result<Vec<Habit>> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_inactive {
            "SELECT id, user_id, title, description, is_active, created_at \
             FROM habits WHERE user_id = ?1 ORDER BY created_at DESC"
        } else {
            "SELECT id, user_id, title, description, is_active, created_at \
             FROM habits WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let habits = stmt
            .query_map(params![user_id], Self::row_to_habit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    pub fn update_habit(
        &self,
        habit_id: i64,
        user_id: i64,
        update: &HabitUpdate,
    ) -> Result<Option<Habit>> {
        let Some(mut habit) = self.get_habit(habit_id, user_id)? else {
            return Ok(None);
        };
        if let Some(title) = &update.title {
            habit.title = title.clone();
        }
        if let Some(description) = &update.description {
            habit.description = Some(description.clone());
        }
        if let Some(is_active) = update.is_active {
            habit.is_active = is_active;
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE habits SET title = ?1, description = ?2, is_active = ?3 \
             WHERE id = ?4 AND user_id = ?5",
            params![
                habit.title,
                habit.description,
                habit.is_active,
                habit_id,
                user_id
            ],
        )?;
        Ok(Some(habit))
    }

    /// Soft delete: the habit keeps its events and streak history but
    /// drops out of referential checks and rollup denominators.
    pub fn deactivate_habit(&self, habit_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE habits SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
            params![habit_id, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn is_active_habit_owned_by(&self, habit_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let owned = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM habits WHERE id = ?1 AND user_id = ?2 AND is_active = 1)",
            params![habit_id, user_id],
            |row| row.get(0),
        )?;
        Ok(owned)
    }

    pub fn count_active_habits(&self, user_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM habits WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u32)
    }

    /// `(total, active)` habit counts for the overview.
    pub fn count_habits(&self, user_id: i64) -> Result<(u32, u32)> {
        let conn = self.conn.lock().unwrap();
        let (total, active) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM habits WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok((total as u32, active as u32))
    }

    fn row_to_habit(row: &rusqlite::Row) -> rusqlite::Result<Habit> {
        let created_at: String = row.get("created_at")?;
        Ok(Habit {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            is_active: row.get("is_active")?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_default(),
        })
    }
}

/// Upstream directory service. Definite answers are trusted; transport
/// failures surface as errors and the resolver degrades to the local
/// store.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    async fn user_exists(&self, user_id: i64) -> Result<bool>;
    async fn active_habit_owned_by(&self, habit_id: i64, user_id: i64) -> Result<bool>;
}

/// Remote-first directory resolution with a bounded timeout and local
/// fallback.
pub struct DirectoryResolver {
    local: Arc<DirectoryStore>,
    remote: Option<Arc<dyn RemoteDirectory>>,
    timeout: Duration,
}

impl DirectoryResolver {
    pub fn new(
        local: Arc<DirectoryStore>,
        remote: Option<Arc<dyn RemoteDirectory>>,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            timeout,
        }
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        if let Some(remote) = &self.remote {
            match tokio::time::timeout(self.timeout, remote.user_exists(user_id)).await {
                Ok(Ok(answer)) => return Ok(answer),
                Ok(Err(err)) => tracing::debug!(
                    target: "cadence::directory",
                    "remote user lookup failed ({err}), using local directory"
                ),
                Err(_) => tracing::debug!(
                    target: "cadence::directory",
                    "remote user lookup timed out, using local directory"
                ),
            }
        }
        self.local.user_exists(user_id)
    }

    pub async fn active_habit_owned_by(&self, habit_id: i64, user_id: i64) -> Result<bool> {
        if let Some(remote) = &self.remote {
            match tokio::time::timeout(
                self.timeout,
                remote.active_habit_owned_by(habit_id, user_id),
            )
            .await
            {
                Ok(Ok(answer)) => return Ok(answer),
                Ok(Err(err)) => tracing::debug!(
                    target: "cadence::directory",
                    "remote habit lookup failed ({err}), using local directory"
                ),
                Err(_) => tracing::debug!(
                    target: "cadence::directory",
                    "remote habit lookup timed out, using local directory"
                ),
            }
        }
        self.local.is_active_habit_owned_by(habit_id, user_id)
    }
}
