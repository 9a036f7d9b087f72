//! 통합 테스트 공용 유틸리티: 가짜 RCON 서버, 스텁 서버 디렉토리, 라우터 구성

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

use mc_manager::api::{build_router, ApiState};
use mc_manager::events::EventHub;
use mc_manager::protocol::client::ConsoleClient;
use mc_manager::protocol::rcon::{RconPacket, PACKET_AUTH, PACKET_AUTH_RESPONSE, PACKET_RESPONSE_VALUE};
use mc_manager::protocol::RconOptions;
use mc_manager::status::StatusProjector;
use mc_manager::supervisor::{Supervisor, SupervisorConfig, Timings};

// ═══════════════════════════════════════════════════════
// 가짜 RCON 서버
// ═══════════════════════════════════════════════════════

type ReplyFn = dyn Fn(&str) -> String + Send + Sync;

pub struct FakeRcon {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeRcon {
    pub fn options(&self) -> RconOptions {
        RconOptions::new("127.0.0.1", self.port, "pw").with_timeout(Duration::from_secs(2))
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Accepts any password and answers each command with `reply(command)`.
pub async fn spawn_fake_rcon<F>(reply: F) -> FakeRcon
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let reply: Arc<ReplyFn> = Arc::new(reply);

    {
        let connections = connections.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let reply = reply.clone();
                let commands = commands.clone();
                tokio::spawn(serve(stream, reply, commands));
            }
        });
    }

    FakeRcon { port, connections, commands }
}

async fn serve(mut stream: TcpStream, reply: Arc<ReplyFn>, commands: Arc<Mutex<Vec<String>>>) {
    loop {
        let size = match stream.read_i32_le().await {
            Ok(size) if size >= 10 => size,
            _ => return,
        };
        let mut data = vec![0u8; size as usize];
        if stream.read_exact(&mut data).await.is_err() {
            return;
        }
        let Ok(packet) = RconPacket::decode(&data) else { return };

        let response = if packet.kind == PACKET_AUTH {
            RconPacket::new(packet.id, PACKET_AUTH_RESPONSE, "")
        } else {
            commands.lock().unwrap().push(packet.body.clone());
            RconPacket::new(packet.id, PACKET_RESPONSE_VALUE, reply(&packet.body))
        };
        let Ok(bytes) = response.encode() else { return };
        if stream.write_all(&bytes).await.is_err() {
            return;
        }
    }
}

// ═══════════════════════════════════════════════════════
// 스텁 서버 / 앱 구성
// ═══════════════════════════════════════════════════════

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn fast_timings() -> Timings {
    Timings {
        grace_window: Duration::from_millis(500),
        terminate_timeout: Duration::from_millis(500),
        kill_confirm: Duration::from_secs(2),
        restart_cooldown: Duration::from_millis(50),
    }
}

pub struct TestApp {
    pub router: Router,
    pub supervisor: Arc<Supervisor>,
    pub console: Arc<ConsoleClient>,
}

pub fn build_app(server_dir: &Path, rcon: RconOptions, tokens: HashMap<String, String>) -> TestApp {
    let mut config = SupervisorConfig::new(server_dir, "start.sh");
    config.timings = fast_timings();

    let console = Arc::new(ConsoleClient::new(rcon));
    let supervisor = Arc::new(Supervisor::new(config, console.clone(), EventHub::default()));
    let status = Arc::new(StatusProjector::new(
        supervisor.clone(),
        "list",
        vec!["forge tps".to_string(), "tps".to_string()],
    ));
    let router = build_router(ApiState::new(supervisor.clone(), status, tokens));
    TestApp { router, supervisor, console }
}

/// Options pointing at a closed port.
pub fn unreachable_rcon() -> RconOptions {
    RconOptions::new("127.0.0.1", 1, "pw").with_timeout(Duration::from_millis(500))
}

pub async fn call(router: &Router, req: Request<Body>) -> (u16, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status().as_u16();
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 256).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}
