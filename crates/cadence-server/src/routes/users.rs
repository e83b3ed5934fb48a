//! Minimal user registration route.

use super::error_response;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use cadence_types::{NewUser, User};
use std::sync::Arc;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), (StatusCode, String)> {
    let user = state.service.create_user(&req).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(user)))
}
