//! Best-effort recalculation of a user's current rollups.

use crate::RollupCalculator;
use cadence_types::PeriodKey;
use chrono::{Local, NaiveDate};
use std::sync::Arc;

/// Refreshes today's, this week's, and this month's rollups for a user.
///
/// Stateless and idempotent: repeated invocation over the same event set
/// converges to the same rollup values. Each step's failure is logged
/// and absorbed, so a partial failure never surfaces to the caller.
/// Safe to trigger fire-and-forget after every completion write, and
/// safe to retry or skip.
pub struct Recalculator {
    rollups: Arc<RollupCalculator>,
}

impl Recalculator {
    pub fn new(rollups: Arc<RollupCalculator>) -> Self {
        Self { rollups }
    }

    pub fn recalculate_all(&self, user_id: i64) {
        self.recalculate_all_as_of(user_id, Local::now().date_naive());
    }

    pub fn recalculate_all_as_of(&self, user_id: i64, today: NaiveDate) {
        let keys = [
            PeriodKey::Day(today),
            PeriodKey::week_of(today),
            PeriodKey::month_of(today),
        ];
        for key in keys {
            if let Err(err) = self.rollups.refresh(user_id, key) {
                tracing::warn!(
                    target: "cadence::recalc",
                    "refresh of {key} failed for user {user_id}: {err}"
                );
            }
        }
        tracing::debug!(target: "cadence::recalc", "recalculated rollups for user {user_id}");
    }
}
