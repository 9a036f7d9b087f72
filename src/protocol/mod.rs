pub mod rcon;
pub mod client;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 원격 콘솔(RCON) 통신 오류 타입
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("RCON not connected")]
    NotConnected,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ProtocolError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::AuthError(_) => "AUTH_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Protocol(_) => "PROTOCOL_ERROR",
        }
    }
}

/// Where and how to reach the managed server's remote console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconOptions {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub password: String,
    /// Applies to connect, each write and each reply read.
    pub timeout: Duration,
}

impl RconOptions {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
