//! Source RCON packet framing.
//!
//! Every packet is `size | id | type | body | 0x00 | 0x00`, all integers
//! little-endian `i32`, where `size` counts everything after itself.

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Client → server: authenticate with the RCON password.
pub const SERVERDATA_AUTH: i32 = 3;
/// Server → client: authentication result; id is -1 on failure.
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
/// Client → server: execute a console command.
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
/// Server → client: command output.
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Largest body a server sends in one packet.
pub const MAX_BODY_LEN: usize = 4096;

/// id + type + two terminating NULs.
const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = (HEADER_LEN + self.body.len()) as i32;
        let mut buf = Vec::with_capacity(4 + size as usize);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Decodes a packet from its bytes after the size prefix.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < HEADER_LEN {
            return Err(Error::Rcon(format!(
                "packet too short: {} bytes",
                payload.len()
            )));
        }
        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body = &payload[8..payload.len() - 2];
        let body = match body.iter().position(|b| *b == 0) {
            Some(end) => &body[..end],
            None => body,
        };
        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(Error::Rcon(format!(
                "command too long ({} bytes)",
                self.body.len()
            )));
        }
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let size = reader.read_i32_le().await?;
        if size < HEADER_LEN as i32 || size as usize > MAX_BODY_LEN + HEADER_LEN {
            return Err(Error::Rcon(format!("invalid packet size {}", size)));
        }
        let mut payload = vec![0u8; size as usize];
        reader.read_exact(&mut payload).await?;
        Self::decode(&payload)
    }
}
