//! Shared sink for process output: appends to the [`LogBuffer`] and emits the
//! matching console event while still holding the buffer lock, so subscribers
//! see entries in the same order as the buffer stores them.

use regex::Regex;
use tokio::sync::Mutex;

use super::log_buffer::{parse_log_level, LogBuffer, LogChannel, LogEntry, LogLevel};
use crate::config::DEFAULT_LEVEL_PATTERN;
use crate::events::{EventHub, PanelEvent};

const STARTING_MARKERS: [&str; 2] = ["Starting minecraft server", "Starting server"];
const READY_MARKER: &str = "Done (";

pub struct ConsoleLog {
    buffer: Mutex<LogBuffer>,
    events: EventHub,
    level_pattern: Option<Regex>,
}

impl ConsoleLog {
    pub fn new(capacity: usize, level_pattern: Option<&str>, events: EventHub) -> Self {
        let level_pattern = level_pattern.and_then(|pat| match Regex::new(pat) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid log level pattern '{}': {}, falling back to default", pat, e);
                Regex::new(DEFAULT_LEVEL_PATTERN).ok()
            }
        });
        Self {
            buffer: Mutex::new(LogBuffer::with_capacity(capacity)),
            events,
            level_pattern,
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Record one line from the process (or typed by an operator).
    pub async fn record(&self, channel: LogChannel, text: String) -> LogEntry {
        let level = match channel {
            LogChannel::Input => LogLevel::Info,
            LogChannel::Stdout => parse_log_level(&text, self.level_pattern.as_ref()),
            // stderr lines default to at least Warn
            LogChannel::Stderr => match parse_log_level(&text, self.level_pattern.as_ref()) {
                LogLevel::Info | LogLevel::Debug => LogLevel::Warn,
                other => other,
            },
        };
        let progress = match channel {
            LogChannel::Stdout => startup_progress(&text),
            _ => None,
        };

        let mut buffer = self.buffer.lock().await;
        let entry = buffer.push(channel, text, level);
        self.events.emit(PanelEvent::ConsoleOutput(entry.clone()));
        drop(buffer);

        if let Some((message, pct)) = progress {
            self.events.progress(message, pct);
        }
        entry
    }

    pub async fn tail(&self, count: usize) -> Vec<LogEntry> {
        self.buffer.lock().await.tail(count)
    }

    pub async fn since(&self, id: u64) -> Vec<LogEntry> {
        self.buffer.lock().await.since(id)
    }

    pub async fn clear(&self) {
        self.buffer.lock().await.clear();
    }
}

/// Startup milestones announced by the server on stdout.
fn startup_progress(line: &str) -> Option<(&'static str, u8)> {
    if line.contains(READY_MARKER) {
        Some(("Server is ready", 100))
    } else if STARTING_MARKERS.iter().any(|m| line.contains(m)) {
        Some(("Minecraft server starting up...", 80))
    } else {
        None
    }
}
