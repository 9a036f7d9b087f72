use super::rcon::RconConnection;
use super::{ProtocolError, RconOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Process-wide owner of the single remote console session.
///
/// Every caller goes through [`ConsoleClient::session`], which hands out an
/// exclusive guard. A status poll and a manual console command therefore
/// queue up behind each other instead of interleaving their request/reply
/// pairs on one socket.
#[derive(Debug)]
pub struct ConsoleClient {
    options: RconOptions,
    slot: Mutex<Option<RconConnection>>,
    connections_opened: AtomicU64,
}

/// Exclusive access to the console session for the lifetime of the guard.
pub struct ConsoleSession<'a> {
    client: &'a ConsoleClient,
    slot: MutexGuard<'a, Option<RconConnection>>,
}

impl ConsoleClient {
    pub fn new(options: RconOptions) -> Self {
        Self {
            options,
            slot: Mutex::new(None),
            connections_opened: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &RconOptions {
        &self.options
    }

    /// Wait for exclusive use of the session.
    pub async fn session(&self) -> ConsoleSession<'_> {
        ConsoleSession {
            client: self,
            slot: self.slot.lock().await,
        }
    }

    /// 이미 인증된 세션이 있으면 재사용, 없으면 새로 연결
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        self.session().await.connect().await
    }

    pub async fn send(&self, command: &str) -> Result<String, ProtocolError> {
        self.session().await.send(command).await
    }

    pub async fn disconnect(&self) {
        self.session().await.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Connect, send one command and disconnect without letting any other
    /// caller touch the session in between.
    pub async fn exchange(&self, command: &str) -> Result<String, ProtocolError> {
        let mut session = self.session().await;
        let result = match session.connect().await {
            Ok(()) => session.send(command).await,
            Err(e) => Err(e),
        };
        session.disconnect().await;
        result
    }

    /// Number of TCP sessions opened since construction.
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }
}

impl ConsoleSession<'_> {
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.slot.is_some() {
            return Ok(());
        }
        let conn = RconConnection::connect(&self.client.options).await?;
        self.client.connections_opened.fetch_add(1, Ordering::Relaxed);
        *self.slot = Some(conn);
        Ok(())
    }

    /// Requires a connected session. Any failure tears the session down so
    /// the next `connect` opens a fresh one.
    pub async fn send(&mut self, command: &str) -> Result<String, ProtocolError> {
        let conn = self.slot.as_mut().ok_or(ProtocolError::NotConnected)?;
        match conn.execute(command).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::warn!("RCON command '{}' failed, dropping session: {}", command, e);
                self.slot.take();
                Err(e)
            }
        }
    }

    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.slot.take() {
            conn.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }
}
