//! Copies process output to the host's standard streams.

use crate::runner::ActiveConfig;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Where one output line goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Stdout,
    Stderr,
    /// Echoes the secret; never forwarded.
    Drop,
}

/// Routes `line` according to the redaction and diagnostic settings.
pub fn route(line: &str, secret: &str, redact: bool, marker: Option<&str>) -> Route {
    if redact && !secret.is_empty() && line.contains(secret) {
        return Route::Drop;
    }
    match marker {
        Some(marker) if !marker.is_empty() && line.contains(marker) => Route::Stderr,
        _ => Route::Stdout,
    }
}

/// Copies `reader` line by line until EOF or until `closed` fires.
///
/// Settings are read from `config` for every line, so a rotated password
/// is redacted from the next line on. A terminal whose other side is gone
/// reports `EIO`, which counts as EOF. Returns the number of lines dropped.
pub async fn copy_output<R, O, E>(
    mut reader: R,
    config: &ActiveConfig,
    mut out: O,
    mut err: E,
    closed: &CancellationToken,
) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut dropped = 0;
    let mut buf = Vec::with_capacity(512);
    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read,
            // Bytes read so far are kept in `buf`.
            _ = closed.cancelled() => Ok(0),
        };
        match read {
            Ok(0) if buf.is_empty() => break,
            Ok(_) => {}
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        let line = String::from_utf8_lossy(&buf);
        let current = config.current();
        let settings = &current.runner;
        match route(
            &line,
            &current.server.rcon.password,
            settings.redact_secret,
            settings.diagnostic_marker.as_deref(),
        ) {
            Route::Stdout => {
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
            }
            Route::Stderr => {
                err.write_all(line.as_bytes()).await?;
                err.flush().await?;
            }
            Route::Drop => dropped += 1,
        }
        if closed.is_cancelled() {
            break;
        }
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    fn active(yaml: &str) -> ActiveConfig {
        ActiveConfig::new(RunnerConfig::parse_from_str(yaml).unwrap())
    }

    #[test]
    fn routes_secret_and_marker_lines() {
        assert_eq!(route("rcon_password hunter2", "hunter2", true, None), Route::Drop);
        assert_eq!(route("rcon_password hunter2", "hunter2", false, None), Route::Stdout);
        assert_eq!(route("L ERROR: boom", "x", true, Some("ERROR")), Route::Stderr);
        assert_eq!(route("anything", "", true, None), Route::Stdout);
    }

    #[tokio::test]
    async fn copies_until_eof() {
        let config = active(
            r#"
server: { name: alpha, rcon: { password: hunter2 } }
runner: { diagnosticMarker: "[diag]" }
"#,
        );
        let input = b"hello\r\nrcon_password hunter2\r\n[diag] slow frame\r\nbye".as_slice();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let dropped = copy_output(input, &config, &mut out, &mut err, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(dropped, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "hello\r\nbye");
        assert_eq!(String::from_utf8(err).unwrap(), "[diag] slow frame\r\n");
    }

    #[tokio::test]
    async fn stops_when_closed_without_eof() {
        let config = active("server: { name: alpha, rcon: { password: x } }");
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"partial").await.unwrap();
        let closed = CancellationToken::new();
        let mut out = Vec::new();

        let copy = copy_output(
            tokio::io::BufReader::new(reader),
            &config,
            &mut out,
            tokio::io::sink(),
            &closed,
        );
        let cancel = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            closed.cancel();
        };
        let (copied, ()) = tokio::join!(copy, cancel);

        assert_eq!(copied.unwrap(), 0);
        assert_eq!(out, b"partial");
        drop(writer);
    }
}
