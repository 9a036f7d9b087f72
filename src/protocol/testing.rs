//! In-process fake RCON server for unit tests.

use super::rcon::{RconPacket, PACKET_AUTH, PACKET_AUTH_RESPONSE, PACKET_RESPONSE_VALUE};
use super::RconOptions;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type ReplyFn = dyn Fn(&str) -> String + Send + Sync;

pub struct FakeRcon {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    hang_up: Arc<AtomicBool>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeRcon {
    pub fn options(&self) -> RconOptions {
        RconOptions::new("127.0.0.1", self.port, "pw")
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// The next command received on any connection closes it without a reply.
    pub fn hang_up_on_next_command(&self) {
        self.hang_up.store(true, Ordering::SeqCst);
    }

    pub fn commands_per_connection(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn all_commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().iter().flatten().cloned().collect()
    }
}

pub async fn spawn_fake_rcon<F>(reply: F) -> FakeRcon
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let hang_up = Arc::new(AtomicBool::new(false));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let reply: Arc<ReplyFn> = Arc::new(reply);

    {
        let connections = connections.clone();
        let hang_up = hang_up.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = connections.fetch_add(1, Ordering::SeqCst);
                commands.lock().unwrap().push(Vec::new());
                tokio::spawn(serve(stream, index, reply.clone(), hang_up.clone(), commands.clone()));
            }
        });
    }

    FakeRcon { port, connections, hang_up, commands }
}

async fn serve(
    mut stream: TcpStream,
    index: usize,
    reply: Arc<ReplyFn>,
    hang_up: Arc<AtomicBool>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
) {
    loop {
        let size = match stream.read_i32_le().await {
            Ok(size) => size,
            Err(_) => return,
        };
        let mut data = vec![0u8; size as usize];
        if stream.read_exact(&mut data).await.is_err() {
            return;
        }
        let packet = match RconPacket::decode(&data) {
            Ok(p) => p,
            Err(_) => return,
        };

        let response = if packet.kind == PACKET_AUTH {
            RconPacket::new(packet.id, PACKET_AUTH_RESPONSE, "")
        } else {
            commands.lock().unwrap()[index].push(packet.body.clone());
            if hang_up.swap(false, Ordering::SeqCst) {
                return;
            }
            RconPacket::new(packet.id, PACKET_RESPONSE_VALUE, reply(&packet.body))
        };

        let bytes = match response.encode() {
            Ok(b) => b,
            Err(_) => return,
        };
        if stream.write_all(&bytes).await.is_err() {
            return;
        }
    }
}
