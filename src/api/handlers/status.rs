use axum::{extract::State, response::IntoResponse, Json};

use crate::api::ApiState;

/// GET /api/status: live snapshot (players, tick rate)
pub async fn get_snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.status.snapshot().await)
}
