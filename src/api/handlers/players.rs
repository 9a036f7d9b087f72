//! Player management over the remote console.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::audit;
use crate::api::auth::Identity;
use crate::api::{ApiError, ApiState};
use crate::status::parse::parse_player_list;

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub username: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub username: Option<String>,
    pub action: Option<String>,
}

/// Usernames are one token so they cannot carry extra command text.
fn validate_username(username: Option<&str>) -> Result<&str, ApiError> {
    let name = username.map(str::trim).unwrap_or("");
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("Username required".to_string()));
    }
    Ok(name)
}

fn with_reason(base: String, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("{} {}", base, reason.replace(['\r', '\n'], " ")),
        None => base,
    }
}

/// GET /api/players
pub async fn list(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let response = state.supervisor.console().exchange("list").await?;
    let parsed = parse_player_list(&response);
    Ok(Json(json!({
        "response": response,
        "players": parsed,
    })))
}

/// POST /api/players/kick
pub async fn kick(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ModerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_username(payload.username.as_deref())?;
    let command = with_reason(format!("kick {}", username), payload.reason.as_deref());
    let response = state.supervisor.console().exchange(&command).await?;
    audit(&identity, "players", &command);
    Ok(Json(json!({ "response": response })))
}

/// POST /api/players/ban
pub async fn ban(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ModerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_username(payload.username.as_deref())?;
    let command = with_reason(format!("ban {}", username), payload.reason.as_deref());
    let response = state.supervisor.console().exchange(&command).await?;
    audit(&identity, "players", &command);
    Ok(Json(json!({ "response": response })))
}

/// POST /api/players/whitelist: `action` is `add` or `remove`
pub async fn whitelist(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<WhitelistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::BadRequest("Username and valid action required".to_string());
    let username = validate_username(payload.username.as_deref()).map_err(|_| invalid())?;
    let action = match payload.action.as_deref() {
        Some(action @ ("add" | "remove")) => action,
        _ => return Err(invalid()),
    };

    let command = format!("whitelist {} {}", action, username);
    let response = state.supervisor.console().exchange(&command).await?;
    audit(&identity, "players", &command);
    Ok(Json(json!({ "response": response })))
}
