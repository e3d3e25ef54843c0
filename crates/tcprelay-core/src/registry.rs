use std::collections::HashSet;

use crate::error::RegistryError;
use crate::session::SessionId;

/// Default upper bound on announced sessions.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 4096;

/// Frontend sessions that the current backend has been told about.
///
/// Membership means "a `/connect` notice for this id was sent to the
/// backend currently in the slot".
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashSet<SessionId>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashSet::new(),
            capacity,
        }
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains(&id)
    }

    /// Record `id` as announced.
    ///
    /// Returns `Ok(false)` if it was already present. A new id beyond
    /// capacity is refused with [`RegistryError::Full`].
    pub fn insert(&mut self, id: SessionId) -> Result<bool, RegistryError> {
        if self.sessions.contains(&id) {
            return Ok(false);
        }
        if self.sessions.len() >= self.capacity {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }
        Ok(self.sessions.insert(id))
    }

    pub fn remove(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id)
    }

    /// Forget every session. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let purged = self.sessions.len();
        self.sessions.clear();
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sorted snapshot of registered ids.
    pub fn snapshot(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY)
    }
}
