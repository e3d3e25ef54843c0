use crate::outbound::OutboundHandle;
use crate::session::SessionId;

/// Plain-text notice sent to a second backend claimant before it is closed.
pub const BACKEND_TAKEN_MESSAGE: &str = "There's already a connected backend";

/// Result of a backend claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claimant now holds the slot.
    Installed,
    /// The claimant already held the slot.
    AlreadyHeld,
    /// Another connection holds the slot and keeps it.
    Rejected { incumbent: SessionId },
}

/// Holder of the single backend connection.
#[derive(Debug, Default)]
pub struct BackendSlot {
    occupant: Option<OutboundHandle>,
}

impl BackendSlot {
    pub fn new() -> Self {
        Self { occupant: None }
    }

    /// Install `handle` if the slot is empty. The incumbent always wins.
    pub(crate) fn claim(&mut self, handle: OutboundHandle) -> ClaimOutcome {
        match &self.occupant {
            Some(current) if current.id() == handle.id() => ClaimOutcome::AlreadyHeld,
            Some(current) => ClaimOutcome::Rejected {
                incumbent: current.id(),
            },
            None => {
                self.occupant = Some(handle);
                ClaimOutcome::Installed
            }
        }
    }

    /// Empty the slot if `id` holds it. Returns whether anything changed.
    pub fn release(&mut self, id: SessionId) -> bool {
        if self.is(id) {
            self.occupant = None;
            true
        } else {
            false
        }
    }

    /// Whether `id` is the current backend.
    pub fn is(&self, id: SessionId) -> bool {
        self.occupant.as_ref().is_some_and(|h| h.id() == id)
    }

    pub fn occupant(&self) -> Option<SessionId> {
        self.occupant.as_ref().map(OutboundHandle::id)
    }

    pub fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }

    pub(crate) fn handle(&self) -> Option<&OutboundHandle> {
        self.occupant.as_ref()
    }
}
