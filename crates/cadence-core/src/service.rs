//! Service facade: the operation surface the HTTP layer calls.

use crate::rollup::percentage;
use crate::{
    CadenceError, DirectoryResolver, DirectoryStore, EventStore, Recalculator, RemoteDirectory,
    Result, RollupCalculator, RollupStore, StreakStore, StreakTracker,
};
use cadence_types::{
    CompletionEvent, CompletionFilter, Habit, HabitStreaks, HabitUpdate, NewCompletion, NewHabit,
    NewUser, PeriodKey, PeriodRollup, StreakRecord, User, UserOverview,
};
use chrono::{Local, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Owns the stores and coordinates the record/derive/refresh pipeline.
///
/// A completion write is acknowledged once the event is appended and the
/// habit's streak is updated; the rollup refresh runs as a spawned
/// best-effort task whose failure is logged, never propagated.
pub struct TrackerService {
    events: Arc<EventStore>,
    streaks: Arc<StreakStore>,
    directory: Arc<DirectoryStore>,
    resolver: DirectoryResolver,
    tracker: StreakTracker,
    rollups: Arc<RollupCalculator>,
    recalc: Arc<Recalculator>,
    refresh_timeout: Duration,
}

impl TrackerService {
    /// Wire up all stores on one database file. `remote` is the optional
    /// upstream directory; `upstream_timeout` bounds each remote lookup
    /// and the spawned rollup refresh.
    pub fn open(
        db_path: &Path,
        remote: Option<Arc<dyn RemoteDirectory>>,
        upstream_timeout: Duration,
    ) -> Result<Self> {
        let events = Arc::new(EventStore::open(db_path)?);
        let streaks = Arc::new(StreakStore::open(db_path)?);
        let directory = Arc::new(DirectoryStore::open(db_path)?);
        let cache = Arc::new(RollupStore::open(db_path)?);
        let rollups = Arc::new(RollupCalculator::new(
            events.clone(),
            streaks.clone(),
            directory.clone(),
            cache,
        ));
        let recalc = Arc::new(Recalculator::new(rollups.clone()));
        let resolver = DirectoryResolver::new(directory.clone(), remote, upstream_timeout);
        let tracker = StreakTracker::new(events.clone(), streaks.clone());
        Ok(Self {
            events,
            streaks,
            directory,
            resolver,
            tracker,
            rollups,
            recalc,
            refresh_timeout: upstream_timeout,
        })
    }

    /// Record a completion: verify the user and habit ownership, append,
    /// update the streak, then kick off a best-effort rollup refresh.
    pub async fn record_completion(&self, new: NewCompletion) -> Result<CompletionEvent> {
        if !self.resolver.user_exists(new.user_id).await? {
            return Err(CadenceError::Referential(format!(
                "user {} not found",
                new.user_id
            )));
        }
        if !self
            .resolver
            .active_habit_owned_by(new.habit_id, new.user_id)
            .await?
        {
            return Err(CadenceError::Referential(format!(
                "habit {} not found or inactive",
                new.habit_id
            )));
        }

        let event = self.events.append(&new)?;
        self.tracker.update(new.habit_id, new.user_id)?;
        self.spawn_refresh(new.user_id);
        Ok(event)
    }

    /// List completion events, newest date first.
    pub fn list_completions(&self, filter: &CompletionFilter) -> Result<Vec<CompletionEvent>> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(CadenceError::Validation(
                    "start_date must not be after end_date".into(),
                ));
            }
        }
        self.events.list(filter)
    }

    /// The habit's streak record; the zero record when none is stored.
    pub fn get_streak(&self, habit_id: i64, user_id: i64) -> Result<StreakRecord> {
        self.streaks.get(habit_id, user_id)
    }

    pub fn daily_stats(&self, user_id: i64, date: Option<NaiveDate>) -> Result<PeriodRollup> {
        let key = PeriodKey::Day(date.unwrap_or_else(today));
        self.rollups.get_or_compute(user_id, key)
    }

    /// Weekly stats. A supplied start date is used verbatim as the
    /// window start; the default is Monday of the current week.
    pub fn weekly_stats(&self, user_id: i64, week_start: Option<NaiveDate>) -> Result<PeriodRollup> {
        let key = match week_start {
            Some(start) => PeriodKey::Week(start),
            None => PeriodKey::week_of(today()),
        };
        self.rollups.get_or_compute(user_id, key)
    }

    /// Monthly stats for a `"YYYY-MM"` key; the current month by default.
    pub fn monthly_stats(&self, user_id: i64, month: Option<&str>) -> Result<PeriodRollup> {
        let key = match month {
            Some(raw) => PeriodKey::month_from_str(raw).ok_or_else(|| {
                CadenceError::Validation(format!("month must be YYYY-MM, got {raw:?}"))
            })?,
            None => PeriodKey::month_of(today()),
        };
        self.rollups.get_or_compute(user_id, key)
    }

    /// Queue a full rollup recalculation for the user and return
    /// immediately.
    pub fn request_recalculation(&self, user_id: i64) {
        self.spawn_refresh(user_id);
    }

    pub fn habits_with_streaks(&self, user_id: i64) -> Result<Vec<HabitStreaks>> {
        self.streaks.habits_with_streaks(user_id)
    }

    /// Cross-period standing: habit counts, today's completion rate, and
    /// the best current/longest streaks with their habit titles.
    pub fn overview(&self, user_id: i64) -> Result<UserOverview> {
        let (total_habits, active_habits) = self.directory.count_habits(user_id)?;
        let completed_today = self.events.count_habits_completed_on(user_id, today())?;
        let best_current = self.streaks.best_current_with_title(user_id)?;
        let best_longest = self.streaks.best_longest_with_title(user_id)?;
        Ok(UserOverview {
            total_habits,
            active_habits,
            completed_today,
            today_completion_percentage: percentage(completed_today, active_habits),
            tracked_streaks: self.streaks.count(user_id)?,
            best_current_streak: best_current.as_ref().map_or(0, |(streak, _)| *streak),
            best_current_streak_habit: best_current.map(|(_, title)| title),
            best_longest_streak: best_longest.as_ref().map_or(0, |(streak, _)| *streak),
            best_longest_streak_habit: best_longest.map(|(_, title)| title),
            total_completions: self.events.count_all(user_id)?,
        })
    }

    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        self.directory.create_user(new)
    }

    /// Create a habit and seed its zero streak record.
    pub fn create_habit(&self, new: &NewHabit) -> Result<Habit> {
        if !self.directory.user_exists(new.user_id)? {
            return Err(CadenceError::Referential(format!(
                "user {} not found",
                new.user_id
            )));
        }
        let habit = self.directory.create_habit(new)?;
        self.streaks.ensure(habit.id, habit.user_id)?;
        Ok(habit)
    }

    pub fn list_habits(&self, user_id: i64, include_inactive: bool) -> Result<Vec<Habit>> {
        self.directory.list_habits(user_id, include_inactive)
    }

    pub fn update_habit(
        &self,
        habit_id: i64,
        user_id: i64,
        update: &HabitUpdate,
    ) -> Result<Habit> {
        self.directory
            .update_habit(habit_id, user_id, update)?
            .ok_or_else(|| CadenceError::Referential(format!("habit {habit_id} not found")))
    }

    pub fn deactivate_habit(&self, habit_id: i64, user_id: i64) -> Result<()> {
        if !self.directory.deactivate_habit(habit_id, user_id)? {
            return Err(CadenceError::Referential(format!(
                "habit {habit_id} not found"
            )));
        }
        Ok(())
    }

    /// Fire-and-forget rollup refresh: bounded by the configured timeout,
    /// failures logged and swallowed. Never blocks or fails the request
    /// that triggered it.
    fn spawn_refresh(&self, user_id: i64) {
        let recalc = self.recalc.clone();
        let timeout = self.refresh_timeout;
        tokio::spawn(async move {
            let run = tokio::task::spawn_blocking(move || recalc.recalculate_all(user_id));
            match tokio::time::timeout(timeout, run).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(
                    target: "cadence::recalc",
                    "rollup refresh task failed for user {user_id}: {err}"
                ),
                Err(_) => tracing::warn!(
                    target: "cadence::recalc",
                    "rollup refresh timed out for user {user_id}"
                ),
            }
        });
    }
}
