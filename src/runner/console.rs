use crate::error::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type ConsoleWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serialized write point into the supervised process's terminal.
///
/// Each [`write_line`](Console::write_line) holds the lock for exactly one
/// line, so command requests and password rotations never interleave.
pub struct Console {
    writer: Mutex<Option<ConsoleWriter>>,
}

impl Console {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// Console that rejects every write.
    pub fn closed() -> Self {
        Self {
            writer: Mutex::new(None),
        }
    }

    /// Writes `line` plus a newline and flushes.
    pub async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Console("console is closed".to_string()))?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        writer
            .write_all(&buf)
            .await
            .map_err(|e| Error::Console(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Console(e.to_string()))
    }

    /// Drops the writer; later writes fail.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}
