//! Completion recording and listing routes.

use super::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use cadence_types::{CompletionEvent, CompletionFilter, NewCompletion, StreakRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
pub struct CreateCompletionRequest {
    pub habit_id: i64,
    pub user_id: i64,
    /// Either field names the calendar day; `date` wins if both appear.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCompletionRequest>,
) -> Result<(StatusCode, Json<CompletionEvent>), (StatusCode, String)> {
    let Some(completion_date) = req.date.or(req.completion_date) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "date or completion_date is required".to_string(),
        ));
    };

    let event = state
        .service
        .record_completion(NewCompletion {
            habit_id: req.habit_id,
            user_id: req.user_id,
            completion_date,
            notes: req.notes,
        })
        .await
        .map_err(error_response)?;

    info!(
        target: "cadence::api",
        "recorded completion of habit {} on {completion_date}",
        event.habit_id
    );
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Deserialize)]
pub struct ListCompletionsQuery {
    pub user_id: i64,
    #[serde(default)]
    pub habit_id: Option<i64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// A single day; overrides start_date/end_date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct ListCompletionsResponse {
    pub count: usize,
    pub completions: Vec<CompletionEvent>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCompletionsQuery>,
) -> Result<Json<ListCompletionsResponse>, (StatusCode, String)> {
    let (start, end) = match query.date {
        Some(date) => (Some(date), Some(date)),
        None => (query.start_date, query.end_date),
    };
    let completions = state
        .service
        .list_completions(&CompletionFilter {
            user_id: query.user_id,
            habit_id: query.habit_id,
            start,
            end,
        })
        .map_err(error_response)?;

    Ok(Json(ListCompletionsResponse {
        count: completions.len(),
        completions,
    }))
}

#[derive(Deserialize)]
pub struct StreakQuery {
    pub user_id: i64,
}

pub async fn streak(
    State(state): State<Arc<AppState>>,
    Path(habit_id): Path<i64>,
    Query(query): Query<StreakQuery>,
) -> Result<Json<StreakRecord>, (StatusCode, String)> {
    let record = state
        .service
        .get_streak(habit_id, query.user_id)
        .map_err(error_response)?;
    Ok(Json(record))
}
