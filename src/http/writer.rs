use crate::error::{SessionError, SessionResult};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chunk size for plain file bodies.
pub const SEND_CHUNK_SIZE: usize = 8192;
/// Chunk size for range (media) bodies.
pub const RANGE_CHUNK_SIZE: usize = 40000;

/// Runs one socket operation under the connection timeout. A zero timeout
/// disables the limit.
pub(crate) async fn timed<T, F>(timeout: Duration, op: F) -> SessionResult<T>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return Ok(op.await?);
    }
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SessionError::Timeout),
    }
}

/// Writes response bytes to a connection transport, every write bounded by
/// the socket timeout.
pub struct ResponseWriter<'a, W> {
    stream: &'a mut W,
    timeout: Duration,
}

impl<'a, W> ResponseWriter<'a, W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(stream: &'a mut W, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> SessionResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        timed(self.timeout, self.stream.write_all(buf)).await
    }

    /// Streams `body` in chunks of `chunk_size` until it is exhausted or, with
    /// a `limit`, exactly `limit` bytes were sent. Returns the body bytes sent;
    /// fewer than `limit` means the source ended early.
    pub async fn copy_body<R>(
        &mut self,
        body: &mut R,
        limit: Option<u64>,
        chunk_size: usize,
    ) -> SessionResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; chunk_size];
        let mut sent = 0u64;

        loop {
            let want = match limit {
                Some(limit) if sent >= limit => break,
                Some(limit) => chunk_size.min((limit - sent) as usize),
                None => chunk_size,
            };

            let n = body.read(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }

            self.write(&chunk[..n]).await?;
            sent += n as u64;
        }

        Ok(sent)
    }

    pub async fn flush(&mut self) -> SessionResult<()> {
        timed(self.timeout, self.stream.flush()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_body_stops_at_limit() {
        let mut out = Vec::new();
        let mut body: &[u8] = b"0123456789";

        let mut writer = ResponseWriter::new(&mut out, Duration::from_secs(1));
        let sent = writer.copy_body(&mut body, Some(7), 3).await.unwrap();

        assert_eq!(sent, 7);
        assert_eq!(out, b"0123456");
    }

    #[tokio::test]
    async fn copy_body_reports_short_source() {
        let mut out = Vec::new();
        let mut body: &[u8] = b"abc";

        let mut writer = ResponseWriter::new(&mut out, Duration::ZERO);
        let sent = writer.copy_body(&mut body, Some(10), 4).await.unwrap();

        assert_eq!(sent, 3);
        assert_eq!(out, b"abc");
    }
}
