//! Client side of the command channel.
//!
//! Speaks just enough HTTP/1.1 over the runner's Unix socket to post one
//! form-encoded field and read back the status and body.

use crate::config::ServerSpec;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Delivers console commands to a server's runner.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(&self, server: &ServerSpec, command: &str) -> Result<()>;
}

/// Status line and body of a command channel response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResponse {
    pub status: u16,
    pub body: String,
}

impl ChannelResponse {
    fn into_result(self) -> Result<String> {
        match self.status {
            200 => Ok(self.body),
            400 => Err(Error::BadRequest(self.body)),
            403 => Err(Error::Unauthorized(self.body)),
            404 => Err(Error::ServerNotFound(self.body)),
            409 => Err(Error::Console(self.body)),
            status => Err(Error::Other(format!(
                "command channel answered {}: {}",
                status, self.body
            ))),
        }
    }
}

/// [`CommandSender`] that talks to `<server.path>/.srcds_runner.sock`.
#[derive(Debug, Clone)]
pub struct UnixCommandClient {
    socket_override: Option<PathBuf>,
    timeout: Duration,
}

impl Default for UnixCommandClient {
    fn default() -> Self {
        Self {
            socket_override: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl UnixCommandClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always connects to `path` instead of the server directory socket.
    pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_override = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn socket_for(&self, server: &ServerSpec) -> PathBuf {
        self.socket_override
            .clone()
            .unwrap_or_else(|| server.socket_path())
    }

    /// Rotates the live RCON password of a running server.
    pub async fn update_password(&self, server: &ServerSpec, password: &str) -> Result<()> {
        let socket = self.socket_for(server);
        self.post(&socket, "/rconPwUpdate", "password", password)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Posts one form field to `endpoint` and returns the raw response.
    pub async fn post(
        &self,
        socket: &Path,
        endpoint: &str,
        field: &str,
        value: &str,
    ) -> Result<ChannelResponse> {
        tokio::time::timeout(self.timeout, exchange(socket, endpoint, field, value))
            .await
            .map_err(|_| {
                Error::Timeout(format!("command channel {} did not answer", socket.display()))
            })?
    }
}

#[async_trait]
impl CommandSender for UnixCommandClient {
    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn send_command(&self, server: &ServerSpec, command: &str) -> Result<()> {
        let socket = self.socket_for(server);
        self.post(&socket, "/", "command", command)
            .await?
            .into_result()
            .map(|_| ())
    }
}

async fn exchange(socket: &Path, endpoint: &str, field: &str, value: &str) -> Result<ChannelResponse> {
    let mut stream = UnixStream::connect(socket).await?;

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(field, value)
        .finish();
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        endpoint,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    parse_response(&raw)
}

/// Parses a complete `Connection: close` HTTP/1.1 response.
///
/// The channel always answers with a sized body. Chunked or otherwise
/// transfer-encoded responses are rejected rather than misread; the body
/// is cut at `Content-Length` when one is given, else read up to EOF.
pub(crate) fn parse_response(raw: &[u8]) -> Result<ChannelResponse> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| Error::Other("truncated command channel response".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let mut body = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::Other(format!("malformed status line: {:?}", status_line)))?;

    for (name, value) in lines.filter_map(|l| l.split_once(':')) {
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") && !value.eq_ignore_ascii_case("identity") {
            return Err(Error::Other(format!(
                "unsupported transfer encoding in command channel response: {}",
                value
            )));
        }
        if name.eq_ignore_ascii_case("content-length") {
            let len = value
                .parse::<usize>()
                .map_err(|_| Error::Other(format!("malformed content length: {:?}", value)))?;
            if len > body.len() {
                return Err(Error::Other("truncated command channel response".to_string()));
            }
            body = &body[..len];
        }
    }

    Ok(ChannelResponse {
        status,
        body: String::from_utf8_lossy(body).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_body() {
        let raw = b"HTTP/1.1 409 Conflict\r\ncontent-length: 7\r\n\r\nclosed\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status, 409);
        assert_eq!(resp.body, "closed");
        assert!(matches!(resp.into_result(), Err(Error::Console(_))));
    }

    #[test]
    fn rejects_truncated_response() {
        assert!(parse_response(b"HTTP/1.1 200 OK\r\n").is_err());
        assert!(parse_response(b"garbage\r\n\r\n").is_err());
    }

    #[test]
    fn body_is_cut_at_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 17\r\n\r\nCommand executed.trailing";
        assert_eq!(parse_response(raw).unwrap().body, "Command executed.");
        assert!(parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 99\r\n\r\nshort").is_err());
    }

    #[test]
    fn rejects_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n11\r\nCommand executed.\r\n0\r\n\r\n";
        assert!(matches!(parse_response(raw), Err(Error::Other(_))));
    }
}
