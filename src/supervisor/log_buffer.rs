//! Bounded console history for the managed process.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

// ─── Log Types ───────────────────────────────────────────────

/// One line of console output, or one injected input line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Sequential ID for polling (`GET /api/server/logs?since=<id>`)
    pub id: u64,
    #[serde(rename = "type")]
    pub channel: LogChannel,
    #[serde(rename = "data")]
    pub text: String,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    Stdout,
    Stderr,
    /// Text written to the process's stdin by an operator
    Input,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

// ─── Log Buffer ──────────────────────────────────────────────

/// FIFO ring of recent entries. The oldest entry is evicted once the
/// capacity is reached; reads never extend an entry's life.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogEntry>,
    next_id: u64,
    max_size: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            lines: VecDeque::with_capacity(max_size),
            next_id: 1,
            max_size,
        }
    }

    /// Append a line and return the stored entry.
    pub fn push(&mut self, channel: LogChannel, text: String, level: LogLevel) -> LogEntry {
        let entry = LogEntry {
            id: self.next_id,
            channel,
            text,
            timestamp: current_timestamp_ms(),
            level,
        };
        self.next_id += 1;

        if self.lines.len() >= self.max_size {
            self.lines.pop_front();
        }
        self.lines.push_back(entry.clone());
        entry
    }

    /// The most recent `count` entries, oldest first.
    pub fn tail(&self, count: usize) -> Vec<LogEntry> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// All entries with `id > since_id`.
    pub fn since(&self, since_id: u64) -> Vec<LogEntry> {
        self.lines.iter()
            .filter(|l| l.id > since_id)
            .cloned()
            .collect()
    }

    /// IDs keep counting after a clear so pollers never see a reused id.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Parse the log level from a server log line using an optional regex pattern.
///
/// The pattern must contain a named capture group `level`. Without a
/// pattern, or when it does not match, the line is `Info`.
///
/// Example patterns:
///   Minecraft: `/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]`
///   Generic:   `(?P<level>INFO|WARN|ERROR|DEBUG|TRACE|FATAL)`
pub fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    if let Some(re) = pattern {
        if let Some(caps) = re.captures(line) {
            if let Some(level_match) = caps.name("level") {
                return match level_match.as_str().to_uppercase().as_str() {
                    "ERROR" | "FATAL" | "SEVERE" => LogLevel::Error,
                    "WARN" | "WARNING" => LogLevel::Warn,
                    "DEBUG" | "TRACE" => LogLevel::Debug,
                    _ => LogLevel::Info,
                };
            }
        }
    }
    LogLevel::Info
}

pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ─── Tests ───────────────────────────────────────────────────
