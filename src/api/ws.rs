//! Push channel: `GET /ws`
//!
//! Every frame is JSON text `{"type": <kind>, "data": <payload>}`. A new
//! connection is primed with `serverStatus` and the last 50 log entries, then
//! receives hub events as they happen.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::auth::Identity;
use super::handlers::audit;
use super::ApiState;
use crate::events::{PanelEvent, StatusChange};
use crate::supervisor::log_buffer::current_timestamp_ms;
use crate::supervisor::{OperationFlags, Supervisor};

const PRIME_LOG_COUNT: usize = 50;
const DEFAULT_LOG_LIMIT: usize = 100;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn frame(kind: &str, data: Value) -> Message {
    Message::Text(json!({ "type": kind, "data": data }).to_string())
}

/// Status record, with the fields of `change` layered on top.
async fn server_status(supervisor: &Supervisor, change: Option<&StatusChange>) -> Value {
    let mut data = serde_json::to_value(supervisor.status().await).unwrap_or_else(|_| json!({}));
    if let (Some(change), Value::Object(map)) = (change, &mut data) {
        if let Ok(Value::Object(extra)) = serde_json::to_value(change) {
            map.extend(extra);
        }
    }
    data
}

/// Hub event → outbound frames. `last_flags` tracks clearing so that a
/// finished clear (from any caller) is announced as `logsCleared`.
async fn translate(
    event: PanelEvent,
    supervisor: &Supervisor,
    last_flags: &mut OperationFlags,
) -> Vec<Message> {
    match event {
        PanelEvent::StatusChanged(change) => {
            vec![frame("serverStatus", server_status(supervisor, Some(&change)).await)]
        }
        PanelEvent::ConsoleOutput(entry) => {
            vec![frame("consoleOutput", serde_json::to_value(entry).unwrap_or(Value::Null))]
        }
        PanelEvent::OperationProgress(progress) => {
            vec![frame("operationProgress", serde_json::to_value(progress).unwrap_or(Value::Null))]
        }
        PanelEvent::OperationStatus(flags) => {
            let mut frames = vec![frame(
                "operationStatus",
                serde_json::to_value(flags).unwrap_or(Value::Null),
            )];
            if last_flags.clearing && !flags.clearing {
                frames.push(frame("logsCleared", json!({ "timestamp": current_timestamp_ms() })));
            }
            *last_flags = flags;
            frames
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: ApiState, identity: Identity) {
    let connection_id = Uuid::new_v4();
    tracing::info!("WebSocket client connected: {} ({})", connection_id, identity);

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    // subscribe before priming so nothing falls between the two
    let mut subscription = state.supervisor.subscribe();

    let prime = [
        frame("serverStatus", server_status(&state.supervisor, None).await),
        frame(
            "consoleLogs",
            serde_json::to_value(state.supervisor.logs(PRIME_LOG_COUNT).await).unwrap_or(Value::Null),
        ),
    ];
    {
        let mut tx = sender.lock().await;
        for message in prime {
            if tx.send(message).await.is_err() {
                tracing::debug!("WebSocket {} closed during priming", connection_id);
                return;
            }
        }
    }

    let forward = {
        let sender = sender.clone();
        let supervisor = state.supervisor.clone();
        tokio::spawn(async move {
            let mut last_flags = supervisor.operations().await;
            while let Some(event) = subscription.recv().await {
                for message in translate(event, &supervisor, &mut last_flags).await {
                    if sender.lock().await.send(message).await.is_err() {
                        return;
                    }
                }
            }
        })
    };

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&text, &state, &identity).await;
                if let Some(reply) = reply {
                    if sender.lock().await.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = sender.lock().await.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket {} error: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    forward.abort();
    tracing::info!("WebSocket client disconnected: {}", connection_id);
}

async fn handle_client_message(text: &str, state: &ApiState, identity: &Identity) -> Option<Message> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Invalid WebSocket message: {}", e);
            return Some(frame("error", json!({ "message": format!("Invalid message: {}", e) })));
        }
    };

    match message.kind.as_str() {
        "sendCommand" => {
            let command = message.data.get("command").and_then(Value::as_str).unwrap_or("").trim();
            if command.is_empty() {
                return Some(frame("error", json!({ "message": "Command is required" })));
            }
            let success = state.supervisor.send_input(command).await;
            if success {
                audit(identity, "console", command);
            }
            Some(frame("commandResult", json!({ "success": success, "command": command })))
        }
        "getLogs" => {
            let limit = message
                .data
                .get("limit")
                .and_then(Value::as_u64)
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_LOG_LIMIT);
            let logs = state.supervisor.logs(limit).await;
            Some(frame("consoleLogs", serde_json::to_value(logs).unwrap_or(Value::Null)))
        }
        "clearLogs" => {
            // `logsCleared` reaches every client through the hub
            state.supervisor.clear_logs().await;
            audit(identity, "server", "clear logs");
            None
        }
        other => {
            tracing::debug!("Unknown WebSocket message type: {}", other);
            Some(frame("error", json!({ "message": format!("Unknown message type: {}", other) })))
        }
    }
}
