use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::envelope::RoutingMetadata;

/// Relay-assigned connection identifier.
///
/// Minted once per accepted connection and never handed out again, so a
/// stale `socket_id` held by the backend can never address a newer peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of [`SessionId`]s, starting at 1.
#[derive(Debug)]
pub struct SessionIdAllocator {
    next: AtomicU64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next identifier.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Role a connection has declared, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unclassified,
    Backend,
    Frontend,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Unclassified => "unclassified",
            Role::Backend => "backend",
            Role::Frontend => "frontend",
        }
    }
}

/// Immutable facts about one accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub created_at: Instant,
}

impl ConnectionInfo {
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            created_at: Instant::now(),
        }
    }

    /// Routing metadata stamped into envelopes on this connection's behalf.
    pub fn metadata(&self) -> RoutingMetadata {
        RoutingMetadata {
            socket_id: self.id,
            port: self.peer.port(),
            address: self.peer.ip(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_strictly_increasing_from_one() {
        let ids = SessionIdAllocator::new();
        let first = ids.next_id();
        let second = ids.next_id();
        let third = ids.next_id();

        assert_eq!(first.get(), 1);
        assert!(first < second && second < third);
    }

    #[test]
    fn allocator_never_repeats_across_threads() {
        let ids = std::sync::Arc::new(SessionIdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = std::sync::Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn metadata_reflects_peer_address() {
        let info = ConnectionInfo::new(SessionId::new(7), "10.0.0.5:4242".parse().unwrap());
        let meta = info.metadata();

        assert_eq!(meta.socket_id, SessionId::new(7));
        assert_eq!(meta.port, 4242);
        assert_eq!(meta.address.to_string(), "10.0.0.5");
    }
}
