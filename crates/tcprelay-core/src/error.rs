use crate::session::SessionId;

/// Errors that can occur in relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] tcprelay_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] tcprelay_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The connection's writer task has gone away.
    #[error("outbound queue for session {0} is closed")]
    QueueClosed(SessionId),

    /// The connection's outbound queue has no free capacity.
    #[error("outbound queue for session {0} is full")]
    QueueFull(SessionId),
}

/// Errors raised by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry already tracks its maximum number of sessions.
    #[error("session registry full (capacity {capacity})")]
    Full { capacity: usize },
}

pub type Result<T> = std::result::Result<T, RelayError>;
