//! Errors raised while serving a request on one connection.
//!
//! None of these ever leave the connection task: each variant either becomes
//! an HTTP error response or closes the transport.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Peer closed the connection in the middle of a header block or body
    #[error("connection closed by peer")]
    Closed,

    /// Header block did not fit into the read buffer
    #[error("request header exceeds {0} bytes")]
    HeaderTooLarge(usize),

    /// Request line could not be parsed
    #[error("malformed request line")]
    Malformed,

    /// Socket read or write exceeded the configured timeout
    #[error("socket timeout")]
    Timeout,

    /// Resource exists but cannot be served right now; answered with 503
    #[error("service unavailable")]
    Unavailable,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Resets and aborts by the peer are routine and only logged at debug level.
    pub fn is_peer_reset(&self) -> bool {
        match self {
            SessionError::Closed => true,
            SessionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
