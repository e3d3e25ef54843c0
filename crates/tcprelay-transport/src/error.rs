use std::net::SocketAddr;

/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create or configure the listening socket.
    #[error("failed to configure socket for {addr}: {source}")]
    Configure {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to start listening on the bound socket.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The underlying OS error, for exit-code mapping.
    pub fn io_source(&self) -> &std::io::Error {
        match self {
            TransportError::Configure { source, .. }
            | TransportError::Bind { source, .. }
            | TransportError::Listen { source, .. } => source,
            TransportError::Accept(source) | TransportError::Io(source) => source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
