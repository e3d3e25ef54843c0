use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::RegistryError;
use crate::outbound::OutboundHandle;
use crate::registry::SessionRegistry;
use crate::session::{ConnectionInfo, SessionId};
use crate::slot::{BackendSlot, ClaimOutcome};

#[derive(Debug)]
struct ConnectionEntry {
    info: ConnectionInfo,
    outbound: OutboundHandle,
}

/// What a frontend envelope should turn into, decided under the lock.
#[derive(Debug)]
pub(crate) enum ForwardPlan {
    /// No backend is installed.
    NoBackend,
    /// The session is new and the registry cannot take it.
    RegistryFull(RegistryError),
    /// The session is new: send `/connect` first, then the envelope.
    Announce {
        backend: OutboundHandle,
        ack: Option<oneshot::Receiver<()>>,
    },
    /// The backend already knows this session.
    Forward { backend: OutboundHandle },
}

/// Where a backend envelope addressed to a session ends up.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// It acknowledged a pending `/connect` and is consumed.
    Acknowledged,
    /// It goes to this open frontend.
    Frontend(OutboundHandle),
    /// No open connection has that id.
    Unknown,
}

/// Everything handlers share: backend slot, session registry, open
/// connections and pending connect acknowledgements.
#[derive(Debug)]
pub struct RelayState {
    backend: BackendSlot,
    registry: SessionRegistry,
    connections: HashMap<SessionId, ConnectionEntry>,
    pending_acks: HashMap<SessionId, oneshot::Sender<()>>,
}

impl RelayState {
    pub fn new(registry_capacity: usize) -> Self {
        Self {
            backend: BackendSlot::new(),
            registry: SessionRegistry::new(registry_capacity),
            connections: HashMap::new(),
            pending_acks: HashMap::new(),
        }
    }

    pub(crate) fn attach(&mut self, info: ConnectionInfo, outbound: OutboundHandle) {
        self.connections
            .insert(info.id, ConnectionEntry { info, outbound });
    }

    pub(crate) fn detach(&mut self, id: SessionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub(crate) fn claim_backend(&mut self, outbound: OutboundHandle) -> ClaimOutcome {
        self.backend.claim(outbound)
    }

    /// Clear the slot if `id` holds it, purging every announced session.
    ///
    /// Returns the number of purged sessions, or `None` if `id` was not the
    /// backend.
    pub(crate) fn release_backend(&mut self, id: SessionId) -> Option<usize> {
        if !self.backend.release(id) {
            return None;
        }
        // Dropping the senders wakes any handler waiting on an ack.
        self.pending_acks.clear();
        Some(self.registry.clear())
    }

    pub(crate) fn plan_forward(&mut self, id: SessionId, await_ack: bool) -> ForwardPlan {
        let Some(backend) = self.backend.handle().cloned() else {
            return ForwardPlan::NoBackend;
        };
        if self.registry.contains(id) {
            return ForwardPlan::Forward { backend };
        }
        if let Err(err) = self.registry.insert(id) {
            return ForwardPlan::RegistryFull(err);
        }

        let ack = await_ack.then(|| {
            let (tx, rx) = oneshot::channel();
            self.pending_acks.insert(id, tx);
            rx
        });
        ForwardPlan::Announce { backend, ack }
    }

    /// Stop waiting for an acknowledgement from `id`'s backend.
    pub(crate) fn cancel_ack(&mut self, id: SessionId) {
        self.pending_acks.remove(&id);
    }

    /// Forget a closing non-backend connection.
    ///
    /// Returns the backend to notify, if one is installed.
    pub(crate) fn retire(&mut self, id: SessionId) -> Option<OutboundHandle> {
        self.pending_acks.remove(&id);
        self.registry.remove(id);
        self.backend.handle().filter(|h| h.id() != id).cloned()
    }

    pub(crate) fn resolve_delivery(&mut self, target: SessionId, connect_ack: bool) -> Delivery {
        if connect_ack {
            if let Some(tx) = self.pending_acks.remove(&target) {
                let _ = tx.send(());
                return Delivery::Acknowledged;
            }
        }
        if self.backend.is(target) {
            return Delivery::Unknown;
        }
        match self.connections.get(&target) {
            Some(entry) => Delivery::Frontend(entry.outbound.clone()),
            None => Delivery::Unknown,
        }
    }

    pub fn backend(&self) -> Option<SessionId> {
        self.backend.occupant()
    }

    pub fn is_backend(&self, id: SessionId) -> bool {
        self.backend.is(id)
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.registry.contains(id)
    }

    pub fn registered_sessions(&self) -> Vec<SessionId> {
        self.registry.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: SessionId) -> Option<&ConnectionInfo> {
        self.connections.get(&id).map(|entry| &entry.info)
    }
}

/// Cloneable handle on the one mutex guarding [`RelayState`].
///
/// The lock is only ever held for a single synchronous operation and never
/// across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<RelayState>>,
}

impl SharedState {
    pub fn new(registry_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayState::new(registry_capacity))),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session currently holding the backend slot.
    pub fn backend(&self) -> Option<SessionId> {
        self.lock().backend()
    }

    /// Sessions announced to the current backend, sorted.
    pub fn registered_sessions(&self) -> Vec<SessionId> {
        self.lock().registered_sessions()
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.lock().is_registered(id)
    }

    /// Number of open connections, backend included.
    pub fn connection_count(&self) -> usize {
        self.lock().connection_count()
    }
}
