use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::audit;
use crate::api::auth::Identity;
use crate::api::{ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub struct ConsoleRequest {
    #[serde(default)]
    pub command: String,
}

/// POST /api/console: stdin when the process runs, RCON otherwise
pub async fn send(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ConsoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.command.trim();
    if command.is_empty() {
        return Err(ApiError::BadRequest("Command required".to_string()));
    }

    if state.supervisor.is_active().await && state.supervisor.send_input(command).await {
        audit(&identity, "console", command);
        return Ok(Json(json!({
            "success": true,
            "via": "stdin",
            "response": "Command sent to server via stdin",
        })));
    }

    let response = state.supervisor.console().exchange(command).await?;
    audit(&identity, "console", command);
    Ok(Json(json!({
        "success": true,
        "via": "rcon",
        "response": response,
    })))
}
