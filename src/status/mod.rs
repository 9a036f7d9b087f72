//! Point-in-time server status: supervisor state joined with a console query.

pub mod parse;

use serde::Serialize;
use std::sync::Arc;

use crate::protocol::client::ConsoleSession;
use crate::protocol::ProtocolError;
use crate::supervisor::Supervisor;
use parse::{parse_player_list, parse_tick_stats, TickStats};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No managed process
    Offline,
    /// Process alive but the console does not answer yet
    Starting,
    Online,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ServerStatus,
    pub managed: bool,
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
    /// `null` when the server offers no tick report
    pub tick: Option<TickStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSnapshot {
    fn empty(status: ServerStatus, managed: bool) -> Self {
        Self {
            status,
            managed,
            online: 0,
            max: 0,
            players: Vec::new(),
            tick: None,
            raw: None,
            error: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            error: Some("Server is not running".to_string()),
            ..Self::empty(ServerStatus::Offline, false)
        }
    }

    pub fn starting(error: &ProtocolError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(ServerStatus::Starting, true)
        }
    }
}

pub struct StatusProjector {
    supervisor: Arc<Supervisor>,
    list_command: String,
    tps_commands: Vec<String>,
}

impl StatusProjector {
    pub fn new(supervisor: Arc<Supervisor>, list_command: impl Into<String>, tps_commands: Vec<String>) -> Self {
        Self {
            supervisor,
            list_command: list_command.into(),
            tps_commands,
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        if !self.supervisor.is_active().await {
            return StatusSnapshot::offline();
        }

        let mut session = self.supervisor.console().session().await;
        let result = self.query(&mut session).await;
        session.disconnect().await;

        match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!("Console not ready for status query: {}", e);
                StatusSnapshot::starting(&e)
            }
        }
    }

    async fn query(&self, session: &mut ConsoleSession<'_>) -> Result<StatusSnapshot, ProtocolError> {
        session.connect().await?;
        let reply = session.send(&self.list_command).await?;
        let tick = self.query_tick(session).await;

        let snapshot = match parse_player_list(&reply) {
            Some(list) => StatusSnapshot {
                online: list.online,
                max: list.max,
                players: list.players,
                tick,
                ..StatusSnapshot::empty(ServerStatus::Online, true)
            },
            None => StatusSnapshot {
                tick,
                raw: Some(reply),
                ..StatusSnapshot::empty(ServerStatus::Online, true)
            },
        };
        Ok(snapshot)
    }

    /// Best effort: first command whose reply parses wins.
    async fn query_tick(&self, session: &mut ConsoleSession<'_>) -> Option<TickStats> {
        for command in &self.tps_commands {
            match session.send(command).await {
                Ok(reply) => {
                    if let Some(stats) = parse_tick_stats(&reply) {
                        return Some(stats);
                    }
                }
                Err(e) => {
                    tracing::debug!("Tick query '{}' failed: {}", command, e);
                    if !session.is_connected() {
                        return None;
                    }
                }
            }
        }
        None
    }
}
