use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::audit;
use crate::api::auth::Identity;
use crate::api::{ApiError, ApiState};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    #[serde(default = "default_graceful")]
    pub graceful: bool,
}

fn default_graceful() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub since: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: String,
}

/// GET /api/server/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.supervisor.status().await)
}

/// GET /api/server/info
pub async fn get_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.supervisor.server_info())
}

/// POST /api/server/start
pub async fn start(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = state.supervisor.start().await?;
    audit(&identity, "server", "start");
    Ok(Json(json!({
        "success": true,
        "message": "Server starting...",
        "pid": pid,
    })))
}

/// POST /api/server/stop: body `{"graceful": bool}` is optional
pub async fn stop(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<StopRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let graceful = payload.map(|Json(p)| p.graceful).unwrap_or(true);
    state.supervisor.stop(graceful).await?;
    audit(
        &identity,
        "server",
        if graceful { "stop (graceful)" } else { "stop (force)" },
    );
    Ok(Json(json!({
        "success": true,
        "message": "Server stopped",
        "graceful": graceful,
    })))
}

/// POST /api/server/restart
pub async fn restart(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = state.supervisor.restart().await?;
    audit(&identity, "server", "restart");
    Ok(Json(json!({
        "success": true,
        "message": "Server restarting...",
        "pid": pid,
    })))
}

/// GET /api/server/logs?limit=100&since=<id>
pub async fn get_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let logs = match query.since {
        Some(since) => {
            let mut logs = state.supervisor.logs_since(since).await;
            if let Some(limit) = query.limit {
                let skip = logs.len().saturating_sub(limit);
                logs.drain(..skip);
            }
            logs
        }
        None => {
            state
                .supervisor
                .logs(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))
                .await
        }
    };
    Json(json!({ "logs": logs }))
}

/// DELETE /api/server/logs
pub async fn clear_logs(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    state.supervisor.clear_logs().await;
    audit(&identity, "server", "clear logs");
    Json(json!({ "success": true, "message": "Logs cleared" }))
}

/// POST /api/server/command: stdin only
pub async fn send_command(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CommandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = payload.command.trim();
    if command.is_empty() {
        return Err(ApiError::BadRequest("Command is required".to_string()));
    }
    if !state.supervisor.send_input(command).await {
        return Err(ApiError::BadRequest("Server is not running".to_string()));
    }
    audit(&identity, "console", command);
    Ok(Json(json!({ "success": true, "message": "Command sent to server" })))
}
