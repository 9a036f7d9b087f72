//! Fan-out of supervisor events to any number of live subscribers.
//!
//! Backed by one `tokio::sync::broadcast` channel, so every subscriber sees
//! events in emission order. A subscriber that falls more than the channel
//! capacity behind skips the overflowed events (at-most-once delivery).

use serde::Serialize;
use tokio::sync::broadcast;

use crate::supervisor::log_buffer::LogEntry;
use crate::supervisor::OperationFlags;

pub const DEFAULT_EVENT_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum PanelEvent {
    StatusChanged(StatusChange),
    ConsoleOutput(LogEntry),
    OperationProgress(OperationProgress),
    OperationStatus(OperationFlags),
}

impl PanelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "statusChanged",
            Self::ConsoleOutput(_) => "consoleOutput",
            Self::OperationProgress(_) => "operationProgress",
            Self::OperationStatus(_) => "operationStatus",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusChange {
    /// `starting` | `stopped` | `error`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusChange {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            pid: None,
            code: None,
            signal: None,
            message: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OperationProgress {
    pub message: String,
    /// 0-100
    pub progress: u8,
}

#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<PanelEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers the event reached.
    pub fn emit(&self, event: PanelEvent) -> usize {
        tracing::debug!("Emitting {}", event.kind());
        self.tx.send(event).unwrap_or(0)
    }

    pub fn progress(&self, message: impl Into<String>, progress: u8) -> usize {
        self.emit(PanelEvent::OperationProgress(OperationProgress {
            message: message.into(),
            progress,
        }))
    }

    /// Dropping the returned subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<PanelEvent>,
    dropped: u64,
}

impl Subscription {
    /// Next event, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<PanelEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    tracing::warn!("Event subscriber lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<PanelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// Events skipped because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
