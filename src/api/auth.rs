//! API 토큰 → 호출자 식별 미들웨어
//!
//! `Authorization: Bearer <token>`, `X-Panel-Token` 헤더 또는 `?token=`
//! 쿼리(브라우저 WebSocket용)로 전달된 토큰을 설정된 식별자 라벨로 바꿔
//! 요청 extension에 붙입니다. 감사 로그는 이 라벨을 사용합니다.
//! 토큰이 하나도 설정되지 않았으면 모든 요청이 `unknown`으로 통과합니다.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::ApiState;

pub const TOKEN_HEADER: &str = "X-Panel-Token";
const FAIL_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Who issued a request, as far as the panel knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 인증 실패 로그 스팸을 억제하기 위한 rate-limiter
static AUTH_FAIL_LAST_LOG: std::sync::Mutex<Option<Instant>> = std::sync::Mutex::new(None);
static AUTH_FAIL_SUPPRESSED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn provided_token(req: &Request<Body>) -> Option<String> {
    let headers = req.headers();
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token.trim().to_string());
    }
    // percent-encoded by browsers building the WebSocket URL
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(query)| query.token)
}

fn log_auth_failure(req: &Request<Body>, provided: Option<&str>) {
    // 30초당 최대 1번 경고 로그, 억제된 횟수 함께 표시
    let should_log = {
        let mut last = AUTH_FAIL_LAST_LOG.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(t) if t.elapsed() < FAIL_LOG_INTERVAL => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    };
    if !should_log {
        AUTH_FAIL_SUPPRESSED.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let hint = match provided {
        None | Some("") => "(empty)".to_string(),
        Some(p) => p.chars().take(4).collect::<String>(),
    };
    let suppressed = AUTH_FAIL_SUPPRESSED.swap(0, Ordering::Relaxed);
    if suppressed > 0 {
        tracing::warn!(
            "API auth failed for {}: got={}… (suppressed {} previous)",
            req.uri().path(), hint, suppressed
        );
    } else {
        tracing::warn!("API auth failed for {}: got={}…", req.uri().path(), hint);
    }
}

/// axum 미들웨어: 토큰 → [`Identity`]
pub async fn identity_middleware(
    State(state): State<ApiState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.identities.is_empty() {
        req.extensions_mut().insert(Identity::unknown());
        return Ok(next.run(req).await);
    }

    let provided = provided_token(&req);
    match provided.as_deref().and_then(|t| state.identities.get(t)) {
        Some(label) => {
            req.extensions_mut().insert(Identity(label.clone()));
            Ok(next.run(req).await)
        }
        None => {
            log_auth_failure(&req, provided.as_deref());
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
