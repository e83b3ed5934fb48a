//! HTTP route handlers.

pub mod completions;
pub mod habits;
pub mod stats;
pub mod users;

use crate::state::AppState;
use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use cadence_core::CadenceError;
use serde::Serialize;
use std::sync::Arc;

/// All /api routes. Shared between main and the integration tests.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Completion tracking
        .route(
            "/completions",
            post(completions::create).get(completions::list),
        )
        .route("/completions/streak/{habit_id}", get(completions::streak))
        // Aggregate statistics
        .route("/stats/overview", get(stats::overview))
        .route("/stats/daily", get(stats::daily))
        .route("/stats/weekly", get(stats::weekly))
        .route("/stats/monthly", get(stats::monthly))
        .route("/stats/recalculate", post(stats::recalculate))
        .route("/stats/habits", get(stats::habits_with_streaks))
        // Directory
        .route("/habits", post(habits::create).get(habits::list))
        .route("/habits/{id}", put(habits::update).delete(habits::remove))
        .route("/users", post(users::create))
        .route("/health", get(health))
}

/// Map an engine error to a response status.
///
/// An unverifiable ownership claim on the write path is rejected as
/// not-found rather than trusted.
pub(crate) fn error_response(err: CadenceError) -> (StatusCode, String) {
    let status = match &err {
        CadenceError::Validation(_) => StatusCode::BAD_REQUEST,
        CadenceError::DuplicateEvent { .. } => StatusCode::CONFLICT,
        CadenceError::Referential(_) | CadenceError::UpstreamUnavailable(_) => {
            StatusCode::NOT_FOUND
        }
        CadenceError::Database(_) | CadenceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
