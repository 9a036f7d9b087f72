use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::RconOptions;
use crate::supervisor::{SupervisorConfig, Timings};

pub const DEFAULT_CONFIG_PATH: &str = "config/panel.toml";

/// Minecraft 서버 로그의 `[Server thread/INFO]` 형식
pub const DEFAULT_LEVEL_PATTERN: &str = r"/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PanelConfig {
    pub server: ServerSection,
    pub rcon: RconSection,
    pub timings: TimingSection,
    pub logs: LogSection,
    pub status: StatusSection,
    pub api: ApiSection,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerSection {
    pub path: String,
    pub start_script: String,
    /// 정상 종료 시 RCON으로 보낼 명령어
    pub stop_command: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            path: "./minecraft-server".to_string(),
            start_script: default_start_script().to_string(),
            stop_command: "stop".to_string(),
        }
    }
}

fn default_start_script() -> &'static str {
    if cfg!(target_os = "windows") {
        "start.bat"
    } else {
        "start.sh"
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RconSection {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for RconSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25575,
            password: "changeme".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TimingSection {
    pub grace_window_secs: u64,
    pub terminate_timeout_secs: u64,
    pub kill_confirm_secs: u64,
    pub restart_cooldown_secs: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            grace_window_secs: 10,
            terminate_timeout_secs: 5,
            kill_confirm_secs: 2,
            restart_cooldown_secs: 3,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogSection {
    pub capacity: usize,
    /// Regex with a named `level` group. Empty string disables parsing.
    pub level_pattern: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            capacity: 1000,
            level_pattern: DEFAULT_LEVEL_PATTERN.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StatusSection {
    pub list_command: String,
    /// Tried in order; the first reply that parses wins.
    pub tps_commands: Vec<String>,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            list_command: "list".to_string(),
            tps_commands: vec!["forge tps".to_string(), "tps".to_string()],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ApiSection {
    pub host: String,
    pub port: u16,
    /// token → identity label
    pub tokens: HashMap<String, String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tokens: HashMap::new(),
        }
    }
}

impl PanelConfig {
    /// `MC_PANEL_CONFIG` (기본값 config/panel.toml) 로드 후 환경 변수 덮어쓰기
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("MC_PANEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from(Path::new(&path))?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// A missing file is not an error; defaults are used instead.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let cfg: Self = toml::from_str(&s)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("MINECRAFT_SERVER_PATH") {
            self.server.path = v;
        }
        if let Some(v) = get("START_SCRIPT") {
            self.server.start_script = v;
        }
        if let Some(v) = get("RCON_HOST") {
            self.rcon.host = v;
        }
        if let Some(v) = get("RCON_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.rcon.port = port,
                Err(_) => tracing::warn!("Ignoring invalid RCON_PORT '{}'", v),
            }
        }
        if let Some(v) = get("RCON_PASSWORD") {
            self.rcon.password = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.api.host = v;
        }
        if let Some(v) = get("PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.api.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT '{}'", v),
            }
        }
        if let Some(v) = get("MC_PANEL_TOKEN") {
            let (token, label) = match v.split_once('=') {
                Some((token, label)) => (token.to_string(), label.to_string()),
                None => (v.clone(), "admin".to_string()),
            };
            if !token.is_empty() {
                self.api.tokens.insert(token, label);
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn rcon_options(&self) -> RconOptions {
        RconOptions::new(&self.rcon.host, self.rcon.port, &self.rcon.password)
            .with_timeout(Duration::from_secs(self.rcon.timeout_secs.max(1)))
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let level_pattern = if self.logs.level_pattern.is_empty() {
            None
        } else {
            Some(self.logs.level_pattern.clone())
        };
        SupervisorConfig {
            server_path: PathBuf::from(&self.server.path),
            start_script: self.server.start_script.clone(),
            stop_command: self.server.stop_command.clone(),
            log_capacity: self.logs.capacity.max(1),
            level_pattern,
            timings: Timings {
                grace_window: Duration::from_secs(self.timings.grace_window_secs),
                terminate_timeout: Duration::from_secs(self.timings.terminate_timeout_secs),
                kill_confirm: Duration::from_secs(self.timings.kill_confirm_secs),
                restart_cooldown: Duration::from_secs(self.timings.restart_cooldown_secs),
            },
        }
    }
}
