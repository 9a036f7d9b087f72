use super::{ProtocolError, RconOptions};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Packet types (Minecraft / Source RCON)
pub const PACKET_RESPONSE_VALUE: i32 = 0;
pub const PACKET_COMMAND: i32 = 2;
pub const PACKET_AUTH_RESPONSE: i32 = 2;
pub const PACKET_AUTH: i32 = 3;

/// Upper bound for the length field of a single inbound packet.
const MAX_PACKET_SIZE: usize = 16 * 1024;
/// id(4) + type(4) + two null terminators
const MIN_PACKET_SIZE: usize = 10;

/// 패킷 구조: [크기 i32][ID i32][타입 i32][페이로드][0x00 0x00]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self { id, kind, body: body.into() }
    }

    /// Encode the packet including its leading length field.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.body.as_bytes();
        let size = (payload.len() + MIN_PACKET_SIZE) as i32;

        let mut packet = Vec::with_capacity(payload.len() + MIN_PACKET_SIZE + 4);
        WriteBytesExt::write_i32::<LittleEndian>(&mut packet, size)
            .map_err(|e| ProtocolError::Protocol(format!("Failed to write packet size: {}", e)))?;
        WriteBytesExt::write_i32::<LittleEndian>(&mut packet, self.id)
            .map_err(|e| ProtocolError::Protocol(format!("Failed to write request ID: {}", e)))?;
        WriteBytesExt::write_i32::<LittleEndian>(&mut packet, self.kind)
            .map_err(|e| ProtocolError::Protocol(format!("Failed to write packet type: {}", e)))?;
        packet.extend_from_slice(payload);
        packet.extend_from_slice(&[0, 0]);
        Ok(packet)
    }

    /// Decode a packet body (everything after the length field).
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(ProtocolError::Protocol(format!("Packet too short: {} bytes", data.len())));
        }
        let mut cursor = data;
        let id = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)
            .map_err(|e| ProtocolError::Protocol(format!("Failed to parse request ID: {}", e)))?;
        let kind = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)
            .map_err(|e| ProtocolError::Protocol(format!("Failed to parse packet type: {}", e)))?;

        let end = cursor.iter().position(|b| *b == 0).unwrap_or(cursor.len());
        let body = String::from_utf8_lossy(&cursor[..end]).into_owned();
        Ok(Self { id, kind, body })
    }
}

/// One authenticated TCP session to the server's RCON port.
///
/// Any I/O error leaves the connection in an undefined state; callers must
/// drop it and open a new one.
#[derive(Debug)]
pub struct RconConnection {
    stream: TcpStream,
    addr: String,
    next_id: i32,
    io_timeout: Duration,
}

impl RconConnection {
    /// TCP 연결 후 인증까지 완료된 세션을 반환
    pub async fn connect(options: &RconOptions) -> Result<Self, ProtocolError> {
        let addr = options.addr();
        let stream = timeout(options.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProtocolError::ConnectionError(format!("Timed out connecting to {}", addr)))?
            .map_err(|e| ProtocolError::ConnectionError(format!("Failed to connect to {}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);

        let mut conn = Self {
            stream,
            addr,
            next_id: 0,
            io_timeout: options.timeout,
        };
        conn.authenticate(&options.password).await?;

        tracing::info!("RCON client connected to {}", conn.addr);
        Ok(conn)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), ProtocolError> {
        let id = self.allocate_id();
        self.write_packet(&RconPacket::new(id, PACKET_AUTH, password)).await?;

        loop {
            let packet = self.read_packet().await?;
            // Source 계열 서버는 인증 응답 전에 빈 RESPONSE_VALUE 패킷을 먼저 보냄
            if packet.kind != PACKET_AUTH_RESPONSE {
                continue;
            }
            if packet.id == -1 {
                return Err(ProtocolError::AuthError("invalid password".to_string()));
            }
            if packet.id != id {
                return Err(ProtocolError::Protocol(format!(
                    "Unexpected auth response id {} (expected {})",
                    packet.id, id
                )));
            }
            return Ok(());
        }
    }

    /// Send one command and return the reply text.
    pub async fn execute(&mut self, command: &str) -> Result<String, ProtocolError> {
        let id = self.allocate_id();
        self.write_packet(&RconPacket::new(id, PACKET_COMMAND, command)).await?;

        loop {
            let packet = self.read_packet().await?;
            if packet.id == -1 {
                return Err(ProtocolError::AuthError("session is no longer authenticated".to_string()));
            }
            if packet.id == id && packet.kind == PACKET_RESPONSE_VALUE {
                return Ok(packet.body);
            }
            tracing::debug!("Discarding stale RCON packet id={} type={}", packet.id, packet.kind);
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
        tracing::info!("RCON client disconnected from {}", self.addr);
    }

    fn allocate_id(&mut self) -> i32 {
        // -1 is reserved for auth failure
        self.next_id = if self.next_id >= i32::MAX - 1 { 1 } else { self.next_id + 1 };
        self.next_id
    }

    async fn write_packet(&mut self, packet: &RconPacket) -> Result<(), ProtocolError> {
        let bytes = packet.encode()?;
        timeout(self.io_timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("write to {}", self.addr)))?
            .map_err(|e| ProtocolError::ConnectionError(format!("Failed to send packet: {}", e)))
    }

    async fn read_packet(&mut self) -> Result<RconPacket, ProtocolError> {
        let mut header = [0u8; 4];
        self.read_exact_timed(&mut header).await?;
        let size = ReadBytesExt::read_i32::<LittleEndian>(&mut &header[..])
            .map_err(|e| ProtocolError::Protocol(format!("Failed to read packet size: {}", e)))?;

        if size < MIN_PACKET_SIZE as i32 || size as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::Protocol(format!("Invalid packet size: {}", size)));
        }

        let mut data = vec![0u8; size as usize];
        self.read_exact_timed(&mut data).await?;
        RconPacket::decode(&data)
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match timeout(self.io_timeout, self.stream.read_exact(buf)).await {
            Err(_) => Err(ProtocolError::Timeout(format!("read from {}", self.addr))),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
                ProtocolError::ConnectionError(format!("Connection closed by {}", self.addr)),
            ),
            Ok(Err(e)) => Err(ProtocolError::ConnectionError(format!("Failed to read packet: {}", e))),
            Ok(Ok(_)) => Ok(()),
        }
    }
}
