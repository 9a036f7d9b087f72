//! Supervisor 전용 에러 타입. 에러 종류를 구분하여 HTTP 핸들러에서
//! 적절한 상태 코드를 반환할 수 있게 합니다.

use axum::http::StatusCode;

use crate::protocol::ProtocolError;

/// Supervisor 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// Missing launch script or server directory
    #[error("{0}")]
    Configuration(String),

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,

    #[error("Another operation is in progress: {0}")]
    OperationInProgress(String),

    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    #[error("Remote console error: {0}")]
    Console(#[from] ProtocolError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyRunning | Self::NotRunning => StatusCode::CONFLICT,
            Self::OperationInProgress(_) => StatusCode::CONFLICT,
            Self::Console(_) => StatusCode::BAD_GATEWAY,
            Self::Spawn(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::NotRunning => "NOT_RUNNING",
            Self::OperationInProgress(_) => "OPERATION_IN_PROGRESS",
            Self::Spawn(_) => "SPAWN_ERROR",
            Self::Console(e) => e.error_code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// axum 핸들러에서 SupervisorError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
