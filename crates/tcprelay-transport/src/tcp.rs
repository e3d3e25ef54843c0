use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listening-socket options applied before `bind`.
#[derive(Debug, Clone)]
pub struct BindOptions {
    /// Set `SO_REUSEADDR` so a restarted relay can rebind immediately.
    pub reuse_address: bool,
    /// Set `SO_REUSEPORT` (Unix only; ignored elsewhere).
    pub reuse_port: bool,
    /// Pending-connection backlog passed to `listen`.
    pub backlog: u32,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            reuse_address: true,
            reuse_port: true,
            backlog: 128,
        }
    }
}

/// An accepted TCP connection and the address it came from.
#[derive(Debug)]
pub struct AcceptedStream {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

/// TCP listening transport.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen with default options.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_options(addr, &BindOptions::default()).await
    }

    /// Bind and listen on `addr` with explicit socket options.
    pub async fn bind_with_options(addr: SocketAddr, options: &BindOptions) -> Result<Self> {
        let configure = |source| TransportError::Configure { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(configure)?;

        if options.reuse_address {
            socket.set_reuseaddr(true).map_err(configure)?;
        }
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        if options.reuse_port {
            socket.set_reuseport(true).map_err(configure)?;
        }

        socket
            .bind(addr)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let listener = socket
            .listen(options.backlog)
            .map_err(|source| TransportError::Listen { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Listen { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<AcceptedStream> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = %err, "failed to set TCP_NODELAY");
        }
        debug!(%peer, "accepted connection");
        Ok(AcceptedStream { stream, peer })
    }

    /// The address this transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
