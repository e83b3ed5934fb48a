//! Minimal habit directory routes: enough CRUD for the local authority
//! to have rows to answer referential checks with.

use super::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use cadence_types::{Habit, HabitUpdate, NewHabit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewHabit>,
) -> Result<(StatusCode, Json<Habit>), (StatusCode, String)> {
    let habit = state.service.create_habit(&req).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(habit)))
}

#[derive(Deserialize)]
pub struct ListHabitsQuery {
    pub user_id: i64,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Serialize)]
pub struct ListHabitsResponse {
    pub habits: Vec<Habit>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListHabitsQuery>,
) -> Result<Json<ListHabitsResponse>, (StatusCode, String)> {
    let habits = state
        .service
        .list_habits(query.user_id, query.include_inactive)
        .map_err(error_response)?;
    Ok(Json(ListHabitsResponse { habits }))
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: i64,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(habit_id): Path<i64>,
    Query(query): Query<OwnerQuery>,
    Json(req): Json<HabitUpdate>,
) -> Result<Json<Habit>, (StatusCode, String)> {
    let habit = state
        .service
        .update_habit(habit_id, query.user_id, &req)
        .map_err(error_response)?;
    Ok(Json(habit))
}

/// Soft delete: deactivates the habit, keeping its history.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(habit_id): Path<i64>,
    Query(query): Query<OwnerQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .service
        .deactivate_habit(habit_id, query.user_id)
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
