//! Managed Process - the one server process under supervision
//!
//! Spawning attaches:
//! - stdout/stderr line readers feeding the shared [`ConsoleLog`]
//! - a stdin writer task fed through an mpsc channel
//! - an exit waiter publishing the exit status on a watch channel

use serde::Serialize;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{mpsc, oneshot, watch};

use super::console_log::ConsoleLog;
use super::log_buffer::LogChannel;

/// How long the exit waiter lets the readers drain after the process is gone.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }

    /// Exit status could not be collected.
    pub fn unknown() -> Self {
        Self { code: None, signal: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {}", code),
            (None, Some(signal)) => format!("signal {}", signal),
            (None, None) => "unknown status".to_string(),
        }
    }
}

type StdinRequest = (String, oneshot::Sender<bool>);

pub struct ManagedProcess {
    pub pid: u32,
    stdin_tx: mpsc::Sender<StdinRequest>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ManagedProcess {
    /// Spawn `cmd` with piped stdio. Output lines go to `console`.
    pub async fn spawn(mut cmd: TokioCommand, console: Arc<ConsoleLog>) -> std::io::Result<Self> {
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "Failed to get PID of spawned process")
        })?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<StdinRequest>(256);
        let (exit_tx, exit_rx) = watch::channel(None);

        let mut readers = Vec::with_capacity(2);

        // ── stdout reader ────────────────────────────────────
        if let Some(stdout) = child.stdout.take() {
            let log = console.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.record(LogChannel::Stdout, line).await;
                }
            }));
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = child.stderr.take() {
            let log = console.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.record(LogChannel::Stderr, line).await;
                }
            }));
        }

        // ── stdin writer ─────────────────────────────────────
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some((line, ack)) = stdin_rx.recv().await {
                    let data = if line.ends_with('\n') { line } else { format!("{}\n", line) };
                    let ok = stdin.write_all(data.as_bytes()).await.is_ok()
                        && stdin.flush().await.is_ok();
                    let _ = ack.send(ok);
                    if !ok {
                        break;
                    }
                }
            });
        }

        // ── process waiter ───────────────────────────────────
        tokio::spawn(async move {
            let info = match child.wait().await {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => {
                    tracing::error!("Failed to wait for process {}: {}", pid, e);
                    ExitInfo::unknown()
                }
            };
            // let the last lines land before announcing the exit
            for reader in readers {
                let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
            }
            tracing::info!("Process {} exited with {}", pid, info.describe());
            let _ = exit_tx.send(Some(info));
        });

        tracing::info!("Process started with PID {}", pid);
        Ok(Self {
            pid,
            stdin_tx,
            exit_rx,
        })
    }

    /// Write one line to stdin. `false` when the pipe is closed.
    pub async fn write_line(&self, line: &str) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.stdin_tx.send((line.to_string(), ack_tx)).await.is_err() {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Wait until the process exits.
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(info) = *rx.borrow_and_update() {
                return info;
            }
            if rx.changed().await.is_err() {
                // waiter task gone without reporting
                return ExitInfo::unknown();
            }
        }
    }

    /// `None` if the process is still alive after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<ExitInfo> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}
