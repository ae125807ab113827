//! Connection Writer
//!
//! Write half of a client connection behind an async mutex, so replies from
//! the command loop and pushes from publishers never interleave bytes. The
//! sink is type-erased so pub/sub registries and tests can hold writers
//! without caring about the transport.

use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::protocol::Frame;

#[derive(Clone)]
pub struct ConnWriter {
    inner: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl ConnWriter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A writer that discards everything. Used when committed cluster
    /// commands are re-applied with no originating connection.
    pub fn sink() -> Self {
        Self::new(tokio::io::sink())
    }

    /// Encode and write one frame. At most one write is in flight per
    /// connection at any time.
    pub async fn write_frame(&self, frame: &Frame) -> io::Result<()> {
        let bytes = frame.to_bytes();
        let mut writer = self.inner.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await
    }
}

impl fmt::Debug for ConnWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnWriter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_writes_are_whole_frames() {
        let (client, server) = tokio::io::duplex(256);
        let writer = ConnWriter::new(server);
        writer.write_frame(&Frame::ok()).await.unwrap();
        writer.write_frame(&Frame::Integer(3)).await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        let mut client = client;
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"+OK\r\n:3\r\n");
    }
}
