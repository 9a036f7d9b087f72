pub mod console_log;
pub mod error;
pub mod log_buffer;
pub mod managed_process;
pub mod process;
pub mod state_machine;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

use crate::events::{EventHub, PanelEvent, StatusChange, Subscription};
use crate::protocol::client::ConsoleClient;
use console_log::ConsoleLog;
use error::SupervisorError;
use log_buffer::{current_timestamp_ms, LogChannel, LogEntry};
use managed_process::{ExitInfo, ManagedProcess};
use process::StopSignal;
use state_machine::{State, StateMachine};

// ─── Configuration ───────────────────────────────────────────

/// Escalation and cooldown windows. Fixed for the life of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after the console stop command before signalling
    pub grace_window: Duration,
    /// Wait after the termination signal before killing
    pub terminate_timeout: Duration,
    /// Wait for the kill to be confirmed
    pub kill_confirm: Duration,
    /// Pause between stop and start during a restart
    pub restart_cooldown: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(10),
            terminate_timeout: Duration::from_secs(5),
            kill_confirm: Duration::from_secs(2),
            restart_cooldown: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub server_path: PathBuf,
    pub start_script: String,
    pub stop_command: String,
    pub log_capacity: usize,
    /// Regex with a named `level` group
    pub level_pattern: Option<String>,
    pub timings: Timings,
}

impl SupervisorConfig {
    pub fn new(server_path: impl Into<PathBuf>, start_script: impl Into<String>) -> Self {
        Self {
            server_path: server_path.into(),
            start_script: start_script.into(),
            stop_command: "stop".to_string(),
            log_capacity: log_buffer::DEFAULT_LOG_CAPACITY,
            level_pattern: Some(crate::config::DEFAULT_LEVEL_PATTERN.to_string()),
            timings: Timings::default(),
        }
    }
}

// ─── Status records ──────────────────────────────────────────

/// Lifecycle operations currently in flight.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct OperationFlags {
    pub starting: bool,
    pub stopping: bool,
    pub restarting: bool,
    pub clearing: bool,
}

impl OperationFlags {
    fn describe(&self) -> &'static str {
        if self.restarting {
            "restart"
        } else if self.starting {
            "start"
        } else if self.stopping {
            "stop"
        } else {
            "lifecycle operation"
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExitRecord {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// Exit was caused by `stop`
    pub requested: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    pub is_running: bool,
    pub state: State,
    pub pid: Option<u32>,
    /// Milliseconds since spawn
    pub uptime: u64,
    pub uptime_formatted: Option<String>,
    pub server_path: String,
    pub resolved_server_path: String,
    pub start_script: String,
    pub operations: OperationFlags,
    pub last_exit: Option<ExitRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server_path: String,
    pub resolved_server_path: String,
    pub start_script: String,
    pub script_path: String,
    pub script_exists: bool,
    pub directory_exists: bool,
    pub stop_command: String,
}

// ─── Supervisor ──────────────────────────────────────────────

struct ProcessSlot {
    machine: StateMachine,
    process: Option<Arc<ManagedProcess>>,
    started_at: Option<Instant>,
    /// Bumped on every spawn; exit reports for older generations are ignored
    generation: u64,
    stop_requested: bool,
    last_exit: Option<ExitRecord>,
}

struct Inner {
    slot: Mutex<ProcessSlot>,
    log: Arc<ConsoleLog>,
    flags: Mutex<OperationFlags>,
}

impl Inner {
    fn events(&self) -> &EventHub {
        self.log.events()
    }

    /// Release the process of `generation` and settle the lifecycle state.
    /// Returns `None` when the report is stale (already handled or newer
    /// process in the slot).
    async fn settle_exit(&self, generation: u64, info: ExitInfo) -> Option<State> {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation || slot.process.is_none() {
            tracing::debug!("Ignoring stale exit report for generation {}", generation);
            return None;
        }

        let requested = slot.stop_requested || slot.machine.state == State::Stopping;
        let next = if requested || info.success() { State::Idle } else { State::Errored };
        if let Err(e) = slot.machine.transition(next) {
            tracing::warn!("{}; forcing {:?}", e, next);
            slot.machine.state = next;
        }
        slot.process = None;
        slot.started_at = None;
        slot.stop_requested = false;
        slot.last_exit = Some(ExitRecord {
            code: info.code,
            signal: info.signal,
            requested,
            timestamp: current_timestamp_ms(),
        });
        drop(slot);

        // `stop` announces its own completion
        if !requested {
            let change = StatusChange {
                code: info.code,
                signal: info.signal,
                ..StatusChange::new(if next == State::Errored { "error" } else { "stopped" })
            };
            let change = if next == State::Errored {
                tracing::warn!("Server process exited unexpectedly with {}", info.describe());
                change.with_message(format!("Server exited unexpectedly with {}", info.describe()))
            } else {
                tracing::info!("Server process exited with {}", info.describe());
                change.with_message("Server process exited")
            };
            self.events().emit(PanelEvent::StatusChanged(change));
        }
        Some(next)
    }
}

/// Owns the lifecycle of the one managed server process.
pub struct Supervisor {
    config: SupervisorConfig,
    console: Arc<ConsoleClient>,
    inner: Arc<Inner>,
    /// Held for the whole of start/stop/restart
    op_lock: Mutex<()>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, console: Arc<ConsoleClient>, events: EventHub) -> Self {
        let log = ConsoleLog::new(config.log_capacity, config.level_pattern.as_deref(), events);
        Self {
            config,
            console,
            inner: Arc::new(Inner {
                slot: Mutex::new(ProcessSlot {
                    machine: StateMachine::new(),
                    process: None,
                    started_at: None,
                    generation: 0,
                    stop_requested: false,
                    last_exit: None,
                }),
                log: Arc::new(log),
                flags: Mutex::new(OperationFlags::default()),
            }),
            op_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn console(&self) -> &Arc<ConsoleClient> {
        &self.console
    }

    pub fn events(&self) -> &EventHub {
        self.inner.events()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.events().subscribe()
    }

    pub async fn state(&self) -> State {
        self.inner.slot.lock().await.machine.state
    }

    /// A process is alive under supervision.
    pub async fn is_active(&self) -> bool {
        self.state().await.is_active()
    }

    pub async fn operations(&self) -> OperationFlags {
        *self.inner.flags.lock().await
    }

    // ── lifecycle ────────────────────────────────────────────

    /// Spawn the server. Returns the new PID.
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let _op = self.begin_operation().await?;
        self.start_locked().await
    }

    /// Stop the server, trying the console stop command first when `graceful`.
    pub async fn stop(&self, graceful: bool) -> Result<(), SupervisorError> {
        let _op = self.begin_operation().await?;
        self.stop_locked(graceful).await
    }

    /// Graceful stop, cooldown, start. Returns the new PID. Fails with
    /// `NotRunning` when there is nothing to stop.
    pub async fn restart(&self) -> Result<u32, SupervisorError> {
        let _op = self.begin_operation().await?;
        self.update_flags(|f| f.restarting = true).await;
        let events = self.inner.events();
        events.progress("Initiating server restart...", 10);

        let result = async {
            self.stop_locked(true).await?;
            events.progress("Server stopped, waiting before restart...", 50);
            tokio::time::sleep(self.config.timings.restart_cooldown).await;
            events.progress("Starting server after restart...", 70);
            let pid = self.start_locked().await?;
            events.progress("Server restart completed", 100);
            Ok::<u32, SupervisorError>(pid)
        }
        .await;

        if let Err(ref e) = result {
            tracing::error!("Restart failed: {}", e);
            events.progress(format!("Restart failed: {}", e), 0);
        }
        self.update_flags(|f| f.restarting = false).await;
        result
    }

    /// Daemon exit: wait for any in-flight operation, then force-stop
    /// whatever is still running.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        let _op = self.op_lock.lock().await;
        if !self.is_active().await {
            return Ok(());
        }
        self.stop_locked(false).await
    }

    async fn begin_operation(&self) -> Result<MutexGuard<'_, ()>, SupervisorError> {
        match self.op_lock.try_lock() {
            Ok(guard) => Ok(guard),
            Err(_) => {
                let flags = self.operations().await;
                Err(SupervisorError::OperationInProgress(flags.describe().to_string()))
            }
        }
    }

    async fn start_locked(&self) -> Result<u32, SupervisorError> {
        if self.is_active().await {
            return Err(SupervisorError::AlreadyRunning);
        }

        self.update_flags(|f| f.starting = true).await;
        let result = self.spawn_server().await;
        self.update_flags(|f| f.starting = false).await;

        if let Err(ref e) = result {
            tracing::error!("Failed to start server: {}", e);
            self.inner.events().progress(format!("Startup failed: {}", e), 0);
        }
        result
    }

    async fn spawn_server(&self) -> Result<u32, SupervisorError> {
        let events = self.inner.events();
        events.progress("Initializing server startup...", 10);

        let dir = process::resolve_server_path(&self.config.server_path);
        let script = dir.join(&self.config.start_script);
        if !dir.is_dir() {
            return Err(SupervisorError::Configuration(format!(
                "Server directory not found: {}",
                dir.display()
            )));
        }
        if !script.is_file() {
            return Err(SupervisorError::Configuration(format!(
                "Start script not found: {}",
                script.display()
            )));
        }

        events.progress("Starting server process...", 30);
        tracing::info!("Launching {} in {}", script.display(), dir.display());

        let mut slot = self.inner.slot.lock().await;
        slot.machine
            .transition(State::Starting)
            .map_err(|e| SupervisorError::Internal(e.into()))?;

        let cmd = process::launch_command(&script, &dir);
        let process = match ManagedProcess::spawn(cmd, self.inner.log.clone()).await {
            Ok(process) => Arc::new(process),
            Err(e) => {
                let _ = slot.machine.transition(State::Idle);
                drop(slot);
                events.emit(PanelEvent::StatusChanged(
                    StatusChange::new("error").with_message(format!("Failed to start server: {}", e)),
                ));
                return Err(SupervisorError::Spawn(e.to_string()));
            }
        };
        let pid = process.pid;

        slot.generation += 1;
        let generation = slot.generation;
        slot.process = Some(process.clone());
        slot.started_at = Some(Instant::now());
        slot.stop_requested = false;
        slot.machine
            .transition(State::Running)
            .map_err(|e| SupervisorError::Internal(e.into()))?;
        drop(slot);

        events.emit(PanelEvent::StatusChanged(
            StatusChange::new("starting").with_pid(pid).with_message("Server is starting"),
        ));
        events.progress("Server process started, waiting for initialization...", 60);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let info = process.wait().await;
            inner.settle_exit(generation, info).await;
        });

        events.progress("Server startup initiated successfully", 90);
        Ok(pid)
    }

    async fn stop_locked(&self, graceful: bool) -> Result<(), SupervisorError> {
        let (process, generation) = {
            let mut slot = self.inner.slot.lock().await;
            let process = match (&slot.process, slot.machine.state.is_active()) {
                (Some(process), true) => process.clone(),
                _ => return Err(SupervisorError::NotRunning),
            };
            slot.stop_requested = true;
            if slot.machine.state != State::Stopping {
                slot.machine
                    .transition(State::Stopping)
                    .map_err(|e| SupervisorError::Internal(e.into()))?;
            }
            (process, slot.generation)
        };

        self.update_flags(|f| f.stopping = true).await;
        let events = self.inner.events();
        events.progress("Initiating server shutdown...", 10);

        let info = self.escalate(&process, graceful).await;
        self.inner.settle_exit(generation, info).await;

        events.progress("Server shutdown completed", 100);
        events.emit(PanelEvent::StatusChanged(StatusChange {
            code: info.code,
            signal: info.signal,
            ..StatusChange::new("stopped").with_message("Server stopped successfully")
        }));
        self.update_flags(|f| f.stopping = false).await;
        tracing::info!("Server stopped ({})", info.describe());
        Ok(())
    }

    /// Console stop command, then TERM, then KILL. Always ends with the
    /// process released, even if the kill was never confirmed.
    async fn escalate(&self, process: &ManagedProcess, graceful: bool) -> ExitInfo {
        let events = self.inner.events();
        let timings = &self.config.timings;

        if graceful {
            events.progress("Attempting graceful shutdown via RCON...", 30);
            match self.console.exchange(&self.config.stop_command).await {
                Ok(_) => {
                    events.progress("Waiting for graceful shutdown...", 60);
                    if let Some(info) = process.wait_timeout(timings.grace_window).await {
                        tracing::info!("Server exited gracefully");
                        return info;
                    }
                }
                Err(e) => {
                    tracing::warn!("RCON shutdown failed: {}", e);
                    events.progress("RCON shutdown failed, using force stop...", 40);
                }
            }
        }

        if let Some(info) = process.exit_info() {
            return info;
        }

        events.progress("Sending termination signal...", 70);
        if let Err(e) = process::send_signal(process.pid, StopSignal::Terminate).await {
            tracing::warn!("{}", e);
        }
        if let Some(info) = process.wait_timeout(timings.terminate_timeout).await {
            return info;
        }

        events.progress("Force killing server process...", 85);
        if let Err(e) = process::send_signal(process.pid, StopSignal::Kill).await {
            tracing::warn!("{}", e);
        }
        match process.wait_timeout(timings.kill_confirm).await {
            Some(info) => info,
            None => {
                tracing::error!("Process {} did not confirm exit after kill", process.pid);
                ExitInfo::unknown()
            }
        }
    }

    async fn update_flags(&self, update: impl FnOnce(&mut OperationFlags)) {
        let snapshot = {
            let mut flags = self.inner.flags.lock().await;
            update(&mut flags);
            *flags
        };
        self.inner.events().emit(PanelEvent::OperationStatus(snapshot));
    }

    // ── console ──────────────────────────────────────────────

    /// Inject one line into the server's stdin. Best effort: `false` when no
    /// process is running or the pipe rejected the write.
    pub async fn send_input(&self, text: &str) -> bool {
        let process = {
            let slot = self.inner.slot.lock().await;
            match (&slot.process, slot.machine.state) {
                (Some(process), State::Running) => process.clone(),
                _ => return false,
            }
        };
        if !process.write_line(text).await {
            tracing::warn!("Failed to write to server stdin");
            return false;
        }
        self.inner.log.record(LogChannel::Input, text.to_string()).await;
        true
    }

    pub async fn logs(&self, limit: usize) -> Vec<LogEntry> {
        self.inner.log.tail(limit).await
    }

    pub async fn logs_since(&self, id: u64) -> Vec<LogEntry> {
        self.inner.log.since(id).await
    }

    pub async fn clear_logs(&self) {
        self.update_flags(|f| f.clearing = true).await;
        self.inner.log.clear().await;
        self.update_flags(|f| f.clearing = false).await;
    }

    // ── queries ──────────────────────────────────────────────

    pub async fn status(&self) -> SupervisorStatus {
        let (state, pid, uptime, last_exit) = {
            let slot = self.inner.slot.lock().await;
            let uptime = slot.started_at.map(|t| t.elapsed().as_millis() as u64);
            (
                slot.machine.state,
                slot.process.as_ref().map(|p| p.pid),
                uptime,
                slot.last_exit.clone(),
            )
        };
        let operations = self.operations().await;

        SupervisorStatus {
            is_running: state.is_active(),
            state,
            pid,
            uptime: uptime.unwrap_or(0),
            uptime_formatted: uptime.map(format_uptime),
            server_path: self.config.server_path.display().to_string(),
            resolved_server_path: process::resolve_server_path(&self.config.server_path)
                .display()
                .to_string(),
            start_script: self.config.start_script.clone(),
            operations,
            last_exit,
        }
    }

    pub fn server_info(&self) -> ServerInfo {
        let dir = process::resolve_server_path(&self.config.server_path);
        let script = dir.join(&self.config.start_script);
        ServerInfo {
            server_path: self.config.server_path.display().to_string(),
            resolved_server_path: dir.display().to_string(),
            start_script: self.config.start_script.clone(),
            script_path: script.display().to_string(),
            script_exists: script.is_file(),
            directory_exists: dir.is_dir(),
            stop_command: self.config.stop_command.clone(),
        }
    }
}

/// `"1d 2h 3m"`, `"2h 5m"`, `"5m 3s"` or `"7s"`.
pub fn format_uptime(ms: u64) -> String {
    let secs = ms / 1000;
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RconOptions;

    fn unreachable_console() -> Arc<ConsoleClient> {
        // port 1 on localhost: connection refused immediately
        Arc::new(ConsoleClient::new(
            RconOptions::new("127.0.0.1", 1, "pw").with_timeout(Duration::from_millis(500)),
        ))
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(7_000), "7s");
        assert_eq!(format_uptime((5 * 60 + 3) * 1000), "5m 3s");
        assert_eq!(format_uptime((2 * 3600 + 5 * 60 + 59) * 1000), "2h 5m");
        assert_eq!(format_uptime((86_400 + 2 * 3600 + 3 * 60) * 1000), "1d 2h 3m");
    }

    #[test]
    fn test_flags_describe_priority() {
        let flags = OperationFlags { starting: true, restarting: true, ..Default::default() };
        assert_eq!(flags.describe(), "restart");
        assert_eq!(OperationFlags::default().describe(), "lifecycle operation");
    }

    #[tokio::test]
    async fn test_start_missing_script_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(dir.path(), "missing.sh"),
            unreachable_console(),
            EventHub::default(),
        );

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Configuration(ref m) if m.starts_with("Start script not found")));
        assert_eq!(supervisor.state().await, State::Idle);
        assert_eq!(supervisor.operations().await, OperationFlags::default());
    }

    #[tokio::test]
    async fn test_start_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(dir.path().join("nope"), "start.sh"),
            unreachable_console(),
            EventHub::default(),
        );
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Configuration(ref m) if m.starts_with("Server directory not found")));
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let supervisor = Supervisor::new(
            SupervisorConfig::new(".", "start.sh"),
            unreachable_console(),
            EventHub::default(),
        );
        assert!(matches!(supervisor.stop(true).await, Err(SupervisorError::NotRunning)));
        assert!(!supervisor.send_input("say hi").await);
    }

    #[tokio::test]
    async fn test_restart_when_idle_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("start.sh"), "#!/bin/sh\nexec sleep 30\n").unwrap();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(dir.path(), "start.sh"),
            unreachable_console(),
            EventHub::default(),
        );

        assert!(matches!(supervisor.restart().await, Err(SupervisorError::NotRunning)));
        assert_eq!(supervisor.state().await, State::Idle);
        assert!(supervisor.status().await.pid.is_none());
        assert!(!supervisor.operations().await.restarting);
    }

    #[tokio::test]
    async fn test_status_and_info_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(dir.path(), "start.sh"),
            unreachable_console(),
            EventHub::default(),
        );
        let status = supervisor.status().await;
        assert!(!status.is_running);
        assert_eq!(status.state, State::Idle);
        assert!(status.pid.is_none());
        assert!(status.uptime_formatted.is_none());

        let info = supervisor.server_info();
        assert!(info.directory_exists);
        assert!(!info.script_exists);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isRunning"], false);
        assert_eq!(json["state"], "idle");
        assert_eq!(json["operations"]["clearing"], false);
    }

    #[tokio::test]
    async fn test_clear_logs_toggles_flag() {
        let hub = EventHub::default();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(".", "start.sh"),
            unreachable_console(),
            hub.clone(),
        );
        let mut sub = hub.subscribe();
        supervisor.clear_logs().await;

        let flags: Vec<bool> = std::iter::from_fn(|| sub.try_recv())
            .filter_map(|e| match e {
                PanelEvent::OperationStatus(f) => Some(f.clearing),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[cfg(unix)]
    mod lifecycle {
        use super::*;
        use crate::protocol::testing::spawn_fake_rcon;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &std::path::Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn fast_timings() -> Timings {
            Timings {
                grace_window: Duration::from_millis(300),
                terminate_timeout: Duration::from_millis(500),
                kill_confirm: Duration::from_secs(2),
                restart_cooldown: Duration::from_millis(50),
            }
        }

        fn supervisor_for(dir: &std::path::Path, script: &str) -> Supervisor {
            supervisor_with_console(dir, script, unreachable_console())
        }

        fn supervisor_with_console(
            dir: &std::path::Path,
            script: &str,
            console: Arc<ConsoleClient>,
        ) -> Supervisor {
            let mut config = SupervisorConfig::new(dir, script);
            config.timings = fast_timings();
            Supervisor::new(config, console, EventHub::default())
        }

        async fn wait_for_line(sub: &mut Subscription, text: &str) {
            loop {
                match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
                    Some(PanelEvent::ConsoleOutput(e)) if e.text == text => break,
                    _ => continue,
                }
            }
            while sub.try_recv().is_some() {}
        }

        fn progress_values(sub: &mut Subscription) -> Vec<u8> {
            std::iter::from_fn(|| sub.try_recv())
                .filter_map(|e| match e {
                    PanelEvent::OperationProgress(p) => Some(p.progress),
                    _ => None,
                })
                .collect()
        }

        #[tokio::test]
        async fn test_start_twice_keeps_pid() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "echo booting\nexec sleep 30");
            let supervisor = supervisor_for(dir.path(), "start.sh");

            let pid = supervisor.start().await.unwrap();
            assert_eq!(supervisor.state().await, State::Running);
            assert!(matches!(supervisor.start().await, Err(SupervisorError::AlreadyRunning)));
            assert_eq!(supervisor.status().await.pid, Some(pid));

            supervisor.stop(false).await.unwrap();
            assert_eq!(supervisor.state().await, State::Idle);
            assert!(supervisor.status().await.last_exit.unwrap().requested);
        }

        #[tokio::test]
        async fn test_unexpected_failure_exit_sets_errored() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "exit 2");
            let supervisor = supervisor_for(dir.path(), "start.sh");
            let mut sub = supervisor.subscribe();

            supervisor.start().await.unwrap();
            let change = loop {
                match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
                    Some(PanelEvent::StatusChanged(c)) if c.status != "starting" => break c,
                    Some(_) => continue,
                    None => panic!("hub closed"),
                }
            };
            assert_eq!(change.status, "error");
            assert_eq!(change.code, Some(2));
            assert_eq!(supervisor.state().await, State::Errored);

            // errored is restartable
            write_script(dir.path(), "start.sh", "exec sleep 30");
            supervisor.start().await.unwrap();
            supervisor.stop(false).await.unwrap();
        }

        #[tokio::test]
        async fn test_escalates_to_kill_when_term_ignored() {
            let dir = tempfile::tempdir().unwrap();
            write_script(
                dir.path(),
                "start.sh",
                "trap '' TERM\necho ready\nwhile true; do sleep 0.1; done",
            );
            let supervisor = supervisor_for(dir.path(), "start.sh");
            let mut sub = supervisor.subscribe();

            supervisor.start().await.unwrap();
            // make sure the trap is installed before signalling
            loop {
                match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
                    Some(PanelEvent::ConsoleOutput(e)) if e.text == "ready" => break,
                    _ => continue,
                }
            }
            while sub.try_recv().is_some() {}

            supervisor.stop(true).await.unwrap();
            assert_eq!(supervisor.state().await, State::Idle);

            let mut progress = Vec::new();
            while let Some(event) = sub.try_recv() {
                if let PanelEvent::OperationProgress(p) = event {
                    progress.push(p.progress);
                }
            }
            // console refused → force path → TERM → KILL → done
            assert_eq!(progress, vec![10, 30, 40, 70, 85, 100]);
            let exit = supervisor.status().await.last_exit.unwrap();
            assert_eq!(exit.signal, Some(9));
        }

        #[tokio::test]
        async fn test_graceful_stop_ignored_escalates_within_bounds() {
            let fake = spawn_fake_rcon(|_| "Stopping the server".to_string()).await;
            let dir = tempfile::tempdir().unwrap();
            write_script(
                dir.path(),
                "start.sh",
                "trap '' TERM\necho ready\nwhile true; do sleep 0.1; done",
            );
            let console = Arc::new(ConsoleClient::new(fake.options()));
            let supervisor = supervisor_with_console(dir.path(), "start.sh", console);
            let mut sub = supervisor.subscribe();

            supervisor.start().await.unwrap();
            wait_for_line(&mut sub, "ready").await;

            let began = Instant::now();
            supervisor.stop(true).await.unwrap();
            let elapsed = began.elapsed();

            let timings = fast_timings();
            let bound = timings.grace_window + timings.terminate_timeout + timings.kill_confirm;
            assert!(elapsed < bound + Duration::from_secs(1), "stop took {:?}", elapsed);
            assert!(elapsed >= timings.grace_window);

            // stop accepted → grace window waited out → TERM → KILL
            assert_eq!(progress_values(&mut sub), vec![10, 30, 60, 70, 85, 100]);
            assert_eq!(fake.commands_per_connection(), vec![vec!["stop".to_string()]]);
            assert!(!supervisor.console().is_connected().await);
            assert_eq!(supervisor.state().await, State::Idle);
            assert_eq!(supervisor.status().await.last_exit.unwrap().signal, Some(9));
        }

        #[tokio::test]
        async fn test_graceful_stop_completes_within_grace_window() {
            let dir = tempfile::tempdir().unwrap();
            let flag = dir.path().join("stop.flag");
            let fake = {
                let flag = flag.clone();
                spawn_fake_rcon(move |cmd| {
                    if cmd == "stop" {
                        let _ = std::fs::write(&flag, "");
                    }
                    "Stopping the server".to_string()
                })
                .await
            };
            write_script(
                dir.path(),
                "start.sh",
                "echo ready\nwhile [ ! -f stop.flag ]; do sleep 0.05; done\nexit 0",
            );
            let console = Arc::new(ConsoleClient::new(fake.options()));
            let supervisor = supervisor_with_console(dir.path(), "start.sh", console);
            let mut sub = supervisor.subscribe();

            supervisor.start().await.unwrap();
            wait_for_line(&mut sub, "ready").await;
            supervisor.stop(true).await.unwrap();

            // no signal needed
            assert_eq!(progress_values(&mut sub), vec![10, 30, 60, 100]);
            let exit = supervisor.status().await.last_exit.unwrap();
            assert_eq!(exit.code, Some(0));
            assert!(exit.signal.is_none());
            assert!(exit.requested);
            assert_eq!(fake.all_commands(), vec!["stop"]);
            assert!(!supervisor.console().is_connected().await);
        }

        #[tokio::test]
        async fn test_send_input_logged_once() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "while read line; do :; done");
            let supervisor = supervisor_for(dir.path(), "start.sh");
            let mut sub = supervisor.subscribe();

            supervisor.start().await.unwrap();
            assert!(supervisor.send_input("say hello").await);

            let inputs: Vec<_> = supervisor
                .logs(100)
                .await
                .into_iter()
                .filter(|e| e.channel == LogChannel::Input)
                .collect();
            assert_eq!(inputs.len(), 1);
            assert_eq!(inputs[0].text, "say hello");

            let echoed = std::iter::from_fn(|| sub.try_recv())
                .filter(|e| matches!(e, PanelEvent::ConsoleOutput(l) if l.text == "say hello"))
                .count();
            assert_eq!(echoed, 1);

            supervisor.stop(false).await.unwrap();
        }

        #[tokio::test]
        async fn test_overlapping_operation_rejected() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "trap '' TERM\nwhile true; do sleep 0.1; done");
            let supervisor = Arc::new(supervisor_for(dir.path(), "start.sh"));
            supervisor.start().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;

            let stopper = {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.stop(false).await })
            };
            tokio::time::sleep(Duration::from_millis(100)).await;

            assert!(matches!(
                supervisor.start().await,
                Err(SupervisorError::OperationInProgress(ref op)) if op == "stop"
            ));
            stopper.await.unwrap().unwrap();
            assert_eq!(supervisor.state().await, State::Idle);
        }

        #[tokio::test]
        async fn test_shutdown_waits_for_restart_in_flight() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "exec sleep 30");
            let supervisor = Arc::new(supervisor_for(dir.path(), "start.sh"));
            supervisor.start().await.unwrap();

            let restarter = {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.restart().await })
            };
            // the restart cooldown alone keeps it in flight past this point
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(supervisor.operations().await.restarting);

            supervisor.shutdown().await.unwrap();
            let restarted = restarter.await.unwrap().unwrap();

            assert_eq!(supervisor.state().await, State::Idle);
            assert!(supervisor.status().await.pid.is_none());
            // the process spawned by the restart is gone too
            assert!(process::send_signal(restarted, StopSignal::Terminate).await.is_err());
        }

        #[tokio::test]
        async fn test_shutdown_when_idle_is_noop() {
            let dir = tempfile::tempdir().unwrap();
            let supervisor = supervisor_for(dir.path(), "start.sh");
            supervisor.shutdown().await.unwrap();
            assert_eq!(supervisor.state().await, State::Idle);
        }

        #[tokio::test]
        async fn test_restart_spawns_new_process() {
            let dir = tempfile::tempdir().unwrap();
            write_script(dir.path(), "start.sh", "exec sleep 30");
            let supervisor = supervisor_for(dir.path(), "start.sh");

            let first = supervisor.start().await.unwrap();
            let second = supervisor.restart().await.unwrap();
            assert_ne!(first, second);
            assert_eq!(supervisor.state().await, State::Running);
            assert!(!supervisor.operations().await.restarting);

            supervisor.stop(false).await.unwrap();
        }
    }
}
