use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::http::parser::ReadBuffer;
use crate::http::session::{Disposition, RequestSession, ServeMode};
use crate::http::writer::timed;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// One accepted connection, plain or TLS, serving requests one after
/// another until either side closes it.
pub struct Connection<S> {
    stream: S,
    buffer: ReadBuffer,
    config: Arc<Config>,
    secure: bool,
    mode: ServeMode,
    state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Waiting for the first bytes of the next request
    Reading,
    /// A request session frames and answers one request
    Processing,
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: Arc<Config>, secure: bool, mode: ServeMode) -> Self {
        Self {
            stream,
            buffer: ReadBuffer::default(),
            config,
            secure,
            mode,
            state: ConnectionState::Reading,
        }
    }

    /// Drives request sessions over the transport. Returns `Ok` on an
    /// orderly close; any error leaves the transport unusable.
    pub async fn run(&mut self) -> SessionResult<()> {
        let timeout = self.config.socket_timeout();

        loop {
            match self.state {
                ConnectionState::Reading => {
                    // Leftover bytes from the previous request are framed first
                    if self.buffer.is_empty()
                        && self.buffer.fill_from(&mut self.stream, timeout).await? == 0
                    {
                        self.state = ConnectionState::Closed;
                        continue;
                    }
                    self.state = ConnectionState::Processing;
                }

                ConnectionState::Processing => {
                    let session = RequestSession::receive(
                        &self.config,
                        &mut self.stream,
                        &mut self.buffer,
                        self.secure,
                    )
                    .await?;

                    self.state = match session.respond(self.mode).await? {
                        Disposition::KeepAlive => ConnectionState::Reading,
                        Disposition::Close => ConnectionState::Closed,
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        if let Err(e) = timed(timeout, self.stream.shutdown()).await {
            debug!(error = %e, "Shutdown after close failed");
        }
        Ok(())
    }
}

/// Serves one accepted socket. With an acceptor the TLS handshake runs
/// first, under the socket timeout; a failed handshake only drops this
/// connection.
pub async fn serve_socket(
    socket: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    tls: Option<TlsAcceptor>,
    mode: ServeMode,
) {
    if let Err(e) = socket.set_nodelay(true) {
        debug!(%peer, error = %e, "Could not set TCP_NODELAY");
    }

    let result = match tls {
        Some(acceptor) => match timed(config.socket_timeout(), acceptor.accept(socket)).await {
            Ok(stream) => Connection::new(stream, config, true, mode).run().await,
            Err(e) => {
                warn!(%peer, error = %e, "TLS handshake failed");
                return;
            }
        },
        None => Connection::new(socket, config, false, mode).run().await,
    };

    match result {
        Ok(()) => debug!(%peer, "Connection closed"),
        Err(SessionError::Timeout) => info!(%peer, "Connection closed, timeout has occurred"),
        Err(e) if e.is_peer_reset() => debug!(%peer, error = %e, "Connection closed by peer"),
        Err(e) => error!(%peer, error = %e, "Connection error"),
    }
}
