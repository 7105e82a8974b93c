use crate::config::Config;
use crate::http::connection::serve_socket;
use crate::http::session::ServeMode;
use crate::server::tls;
use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const LISTEN_BACKLOG: u32 = 1024;

/// HTTP and optional TLS listeners for one webroot.
pub struct Server {
    config: Arc<Config>,
    shutdown: watch::Sender<bool>,
    limiter: Arc<Semaphore>,
    local_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl Server {
    pub fn new(config: Config) -> Self {
        info!("Initializing server");
        info!(domain = %config.domain_name(), "Domain name");
        if !config.local_address.is_unspecified() {
            info!(address = %config.local_address, "Binding to local address");
        }

        let (shutdown, _) = watch::channel(false);
        let limiter = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Self {
            config: Arc::new(config),
            shutdown,
            limiter,
            local_addrs: Vec::new(),
            tasks: Vec::new(),
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Bound addresses, TLS listener first when enabled.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Binds the listeners and spawns their accept loops.
    ///
    /// Bind failures (typically address already in use) are returned to the
    /// caller; nothing is left listening in that case.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.started {
            return Ok(());
        }
        info!("Starting HTTP listener");

        let mut listeners = Vec::new();

        if self.config.tls_enabled {
            info!("Initializing TLS");
            let acceptor = tls::build_acceptor(&self.config.tls)?;
            let listener = bind(self.config.local_address, self.config.tls_port)
                .with_context(|| format!("binding TLS port {}", self.config.tls_port))?;
            listeners.push((listener, Some(acceptor), ServeMode::Files));
            info!("TLS initialized");
        }

        let mode = if self.config.tls_enabled && self.config.tls_redirect {
            info!("Initializing TLS redirect");
            ServeMode::RedirectToTls
        } else {
            ServeMode::Files
        };
        let listener = bind(self.config.local_address, self.config.port)
            .with_context(|| format!("binding port {}", self.config.port))?;
        listeners.push((listener, None, mode));

        self.shutdown.send_replace(false);
        for (listener, acceptor, mode) in listeners {
            let addr = listener.local_addr()?;
            info!(%addr, secure = acceptor.is_some(), "Listening");
            self.local_addrs.push(addr);

            self.tasks.push(tokio::spawn(accept_loop(
                listener,
                acceptor,
                mode,
                Arc::clone(&self.config),
                Arc::clone(&self.limiter),
                self.shutdown.subscribe(),
            )));
        }

        self.started = true;
        info!("HTTP listener started");
        Ok(())
    }

    /// Closes all listeners. Connections already accepted run to completion.
    pub async fn stop(&mut self) {
        info!("Stopping HTTP listener");
        self.started = false;
        self.shutdown.send_replace(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Accept loop ended abnormally");
            }
        }
        self.local_addrs.clear();
        info!("HTTP listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    mode: ServeMode,
    config: Arc<Config>,
    limiter: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(%peer, "Accepted connection");

                    let permit = Arc::clone(&limiter).try_acquire_owned().ok();
                    let mode = if permit.is_some() {
                        mode
                    } else {
                        warn!(%peer, "Connection limit reached");
                        ServeMode::Overloaded
                    };
                    let config = Arc::clone(&config);
                    let tls = tls.clone();

                    tokio::spawn(async move {
                        serve_socket(socket, peer, config, tls, mode).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!(error = %e, "Error occurred while accepting connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    debug!("Accept loop stopped");
}

/// Binds a listener. The unspecified IPv4 address means "all interfaces":
/// a dual-stack IPv6 socket is tried first, plain IPv4 when the platform
/// has no IPv6.
pub fn bind(address: IpAddr, port: u16) -> io::Result<TcpListener> {
    if address == IpAddr::V4(Ipv4Addr::UNSPECIFIED) {
        if let Some(listener) = bind_dual_stack(port)? {
            return Ok(listener);
        }
        info!("IPv6 or IPv6 dual mode not supported, switching to IPv4");
    }

    let socket = match address {
        IpAddr::V4(_) => TcpSocket::new_v4()?,
        IpAddr::V6(_) => TcpSocket::new_v6()?,
    };
    listen_on(socket, SocketAddr::new(address, port))
}

/// `Ok(None)` when the platform has no IPv6 or refuses to clear
/// `IPV6_V6ONLY`; other socket and bind errors are returned.
fn bind_dual_stack(port: u16) -> io::Result<Option<TcpListener>> {
    let socket = match Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP)) {
        Ok(socket) => socket,
        Err(e) if ipv6_unsupported(&e) => {
            debug!(error = %e, "IPv6 socket not supported");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if let Err(e) = socket.set_only_v6(false) {
        debug!(error = %e, "IPv6 dual mode not supported");
        return Ok(None);
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
    match socket.bind(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AddrNotAvailable => return Ok(None),
        Err(e) => return Err(e),
    }
    socket.listen(LISTEN_BACKLOG as i32)?;
    TcpListener::from_std(socket.into()).map(Some)
}

#[cfg(unix)]
fn ipv6_unsupported(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EAFNOSUPPORT)
}

#[cfg(not(unix))]
fn ipv6_unsupported(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Unsupported
}

fn listen_on(socket: TcpSocket, addr: SocketAddr) -> io::Result<TcpListener> {
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}
