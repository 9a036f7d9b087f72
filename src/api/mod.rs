//! HTTP + WebSocket transport over the supervisor and status projector.

pub mod auth;
pub mod handlers;
pub mod ws;

use anyhow::Result;
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::status::StatusProjector;
use crate::supervisor::error::SupervisorError;
use crate::supervisor::Supervisor;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub status: Arc<StatusProjector>,
    /// token → identity label. Empty disables the token check.
    pub identities: Arc<HashMap<String, String>>,
}

impl ApiState {
    pub fn new(
        supervisor: Arc<Supervisor>,
        status: Arc<StatusProjector>,
        identities: HashMap<String, String>,
    ) -> Self {
        Self {
            supervisor,
            status,
            identities: Arc::new(identities),
        }
    }
}

/// Transport-level failures: invalid input, or a core error passed through.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": message,
                    "error_code": "BAD_REQUEST",
                })),
            )
                .into_response(),
            ApiError::Supervisor(e) => e.into_response(),
        }
    }
}

impl From<crate::protocol::ProtocolError> for ApiError {
    fn from(e: crate::protocol::ProtocolError) -> Self {
        ApiError::Supervisor(SupervisorError::Console(e))
    }
}

pub struct ApiServer {
    state: ApiState,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(state: ApiState, listen_addr: &str) -> Self {
        Self {
            state,
            listen_addr: listen_addr.to_string(),
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("Control panel listening on http://{}", self.listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

pub fn build_router(state: ApiState) -> Router {
    use handlers::{console, players, server, status};

    let protected = Router::new()
        .route("/api/server/status", get(server::get_status))
        .route("/api/server/info", get(server::get_info))
        .route("/api/server/start", post(server::start))
        .route("/api/server/stop", post(server::stop))
        .route("/api/server/restart", post(server::restart))
        .route("/api/server/logs", get(server::get_logs).delete(server::clear_logs))
        .route("/api/server/command", post(server::send_command))
        .route("/api/status", get(status::get_snapshot))
        .route("/api/console", post(console::send))
        .route("/api/players", get(players::list))
        .route("/api/players/kick", post(players::kick))
        .route("/api/players/ban", post(players::ban))
        .route("/api/players/whitelist", post(players::whitelist))
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::identity_middleware));

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
