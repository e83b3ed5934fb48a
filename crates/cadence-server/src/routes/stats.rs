//! Aggregate statistics routes.

use super::error_response;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use cadence_types::{HabitStreaks, PeriodRollup, UserOverview};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserOverview>, (StatusCode, String)> {
    let overview = state
        .service
        .overview(query.user_id)
        .map_err(error_response)?;
    Ok(Json(overview))
}

#[derive(Deserialize)]
pub struct DailyQuery {
    pub user_id: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

pub async fn daily(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<PeriodRollup>, (StatusCode, String)> {
    let rollup = state
        .service
        .daily_stats(query.user_id, query.date)
        .map_err(error_response)?;
    Ok(Json(rollup))
}

#[derive(Deserialize)]
pub struct WeeklyQuery {
    pub user_id: i64,
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
}

pub async fn weekly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeeklyQuery>,
) -> Result<Json<PeriodRollup>, (StatusCode, String)> {
    let rollup = state
        .service
        .weekly_stats(query.user_id, query.week_start)
        .map_err(error_response)?;
    Ok(Json(rollup))
}

#[derive(Deserialize)]
pub struct MonthlyQuery {
    pub user_id: i64,
    #[serde(default)]
    pub month: Option<String>,
}

pub async fn monthly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthlyQuery>,
) -> Result<Json<PeriodRollup>, (StatusCode, String)> {
    let rollup = state
        .service
        .monthly_stats(query.user_id, query.month.as_deref())
        .map_err(error_response)?;
    Ok(Json(rollup))
}

#[derive(Deserialize)]
pub struct RecalculateRequest {
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct RecalculateResponse {
    pub accepted: bool,
}

/// Queue a recalculation and return immediately; the refresh runs as a
/// best-effort background task.
pub async fn recalculate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecalculateRequest>,
) -> (StatusCode, Json<RecalculateResponse>) {
    state.service.request_recalculation(req.user_id);
    (
        StatusCode::ACCEPTED,
        Json(RecalculateResponse { accepted: true }),
    )
}

#[derive(Serialize)]
pub struct HabitStreaksResponse {
    pub habits: Vec<HabitStreaks>,
}

pub async fn habits_with_streaks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<HabitStreaksResponse>, (StatusCode, String)> {
    let habits = state
        .service
        .habits_with_streaks(query.user_id)
        .map_err(error_response)?;
    Ok(Json(HabitStreaksResponse { habits }))
}
