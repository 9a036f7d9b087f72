//! Platform adapter: how the start script is launched and how stop signals
//! reach it.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command as TokioCommand;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM / taskkill
    Terminate,
    /// SIGKILL / taskkill /F
    Kill,
}

impl StopSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Terminate => "TERM",
            Self::Kill => "KILL",
        }
    }
}

/// Resolve a possibly relative server path against the current directory.
/// Paths containing spaces are kept as a single `PathBuf`, never re-split.
pub fn resolve_server_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Build the launch command for `script` inside `working_dir`.
///
/// Unix: the script is executed directly as the leader of a new process
/// group so that stop signals also reach the JVM it starts.
#[cfg(not(target_os = "windows"))]
pub fn launch_command(script: &Path, working_dir: &Path) -> TokioCommand {
    let mut cmd = TokioCommand::new(script);
    cmd.current_dir(working_dir).process_group(0);
    cmd
}

/// Windows: `cmd /c <script name>` with the directory passed as cwd, which
/// keeps paths with spaces out of the command line.
#[cfg(target_os = "windows")]
pub fn launch_command(script: &Path, working_dir: &Path) -> TokioCommand {
    let script_name = script
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| script.as_os_str().to_os_string());
    let mut cmd = TokioCommand::new("cmd");
    cmd.arg("/c").arg(script_name).current_dir(working_dir);
    hide_console_window(&mut cmd);
    cmd
}

/// Keep `cmd` and `taskkill` from flashing a console window.
#[cfg(target_os = "windows")]
fn hide_console_window(cmd: &mut TokioCommand) {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

/// Deliver a stop signal to the managed process (and its children).
#[cfg(not(target_os = "windows"))]
pub async fn send_signal(pid: u32, signal: StopSignal) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
        StopSignal::Terminate => Signal::SIGTERM,
        StopSignal::Kill => Signal::SIGKILL,
    };
    tracing::info!("Sending SIG{} to process group {}", signal.name(), pid);

    let target = Pid::from_raw(pid as i32);
    match signal::killpg(target, sig) {
        Ok(()) => Ok(()),
        // not a group leader (or group already gone) → signal the pid itself
        Err(Errno::ESRCH) | Err(Errno::EPERM) => signal::kill(target, sig).map_err(|e| {
            ProcessError::SignalFailed {
                pid,
                reason: e.to_string(),
            }
        }),
        Err(e) => Err(ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(target_os = "windows")]
pub async fn send_signal(pid: u32, signal: StopSignal) -> Result<(), ProcessError> {
    let pid_str = pid.to_string();
    let mut cmd = TokioCommand::new("taskkill");
    cmd.args(["/PID", pid_str.as_str(), "/T"]);
    if signal == StopSignal::Kill {
        cmd.arg("/F");
    }
    hide_console_window(&mut cmd);
    tracing::info!("Running taskkill ({}) for PID {}", signal.name(), pid);

    let output = cmd.output().await.map_err(|e| ProcessError::SignalFailed {
        pid,
        reason: e.to_string(),
    })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(ProcessError::SignalFailed {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
