use crate::error::{SessionError, SessionResult};
use crate::http::request::{Method, RequestHeaders};
use crate::http::writer::timed;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the per-connection read buffer; a header block must fit into it.
pub const READ_BUFFER_SIZE: usize = 20000;

/// Blank line ending a header block.
pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    Incomplete,
}

/// Fixed-size read buffer owned by one connection.
///
/// Bytes read past the end of a header block stay in the buffer and are
/// framed by the next request session instead of being read again.
#[derive(Debug)]
pub struct ReadBuffer {
    data: Box<[u8]>,
    filled: usize,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::with_capacity(READ_BUFFER_SIZE)
    }
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Bytes read but not consumed yet.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Reads once from `stream` into the free tail. Returns the byte count,
    /// 0 meaning the peer closed its side.
    pub async fn fill_from<S>(&mut self, stream: &mut S, timeout: Duration) -> SessionResult<usize>
    where
        S: AsyncRead + Unpin,
    {
        let n = timed(timeout, stream.read(&mut self.data[self.filled..])).await?;
        self.filled += n;
        Ok(n)
    }

    /// Drops the first `n` bytes, moving the rest to the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.data.copy_within(n..self.filled, 0);
        self.filled -= n;
    }
}

/// One framed request header block.
#[derive(Debug)]
pub struct HeaderFrame {
    pub request: RequestHeaders,
    /// Offset right after the terminating blank line
    pub header_end: usize,
}

/// Frames the next header block, reading from `stream` until the buffer
/// holds a complete one.
///
/// A zero-byte read before the terminator is a framing failure
/// (`SessionError::Closed`); so is a header block larger than the buffer.
pub async fn read_header_frame<S>(
    stream: &mut S,
    buffer: &mut ReadBuffer,
    timeout: Duration,
) -> SessionResult<HeaderFrame>
where
    S: AsyncRead + Unpin,
{
    let mut scanned = 0;
    loop {
        if let Some(pos) = find_headers_end(buffer.filled(), scanned) {
            let request = parse_request_head(&buffer.filled()[..pos])
                .map_err(|_| SessionError::Malformed)?;
            return Ok(HeaderFrame {
                request,
                header_end: pos + HEADER_TERMINATOR.len(),
            });
        }
        scanned = buffer.len();

        if buffer.is_full() {
            return Err(SessionError::HeaderTooLarge(buffer.len()));
        }
        if buffer.fill_from(stream, timeout).await? == 0 {
            return Err(SessionError::Closed);
        }
    }
}

/// Parses a complete header block at the start of `buf`.
///
/// Returns the request and the number of bytes the header block occupies,
/// or `ParseError::Incomplete` when the terminator has not arrived yet.
pub fn parse_http_request(buf: &[u8]) -> Result<(RequestHeaders, usize), ParseError> {
    let headers_end = find_headers_end(buf, 0).ok_or(ParseError::Incomplete)?;
    let request = parse_request_head(&buf[..headers_end])?;
    Ok((request, headers_end + HEADER_TERMINATOR.len()))
}

/// Parses the request line and header fields of a header block
/// (terminator excluded). Lines without a `:` are dropped.
pub fn parse_request_head(head: &[u8]) -> Result<RequestHeaders, ParseError> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n").filter(|line| !line.is_empty());

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method = Method::from_token(parts.next().ok_or(ParseError::InvalidRequest)?);
    let url = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().unwrap_or("HTTP/1.0");

    let mut request = RequestHeaders::new(method, url, version);

    // Headers
    for line in lines {
        match line.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                request.headers.insert(key.trim(), value.trim());
            }
            _ => tracing::debug!(line, "Discarding malformed header line"),
        }
    }

    Ok(request)
}

/// Position of the first CR LF CR LF at or after `from`. The search backs up
/// three bytes so a terminator split across two reads is still found.
pub fn find_headers_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEADER_TERMINATOR.len() - 1);
    buf.get(start..)?
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| start + pos)
}
