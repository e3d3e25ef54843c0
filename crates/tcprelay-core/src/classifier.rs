use crate::envelope::{Envelope, ROLE_BACKEND, ROLE_FRONTEND};
use crate::session::Role;

/// What a handler does with one parsed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Try to take the backend slot.
    ClaimBackend,
    /// Frontend announcement; no shared state changes.
    AnnounceFrontend,
    /// Hand to the router.
    Route,
    /// Nothing to do.
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A role was declared after the connection was already classified.
    AlreadyClassified,
    /// The `role` value is neither `backend` nor `frontend`.
    UnknownRole,
    /// No `role` and no `headers`.
    Unroutable,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::AlreadyClassified => "role already declared",
            IgnoreReason::UnknownRole => "unknown role",
            IgnoreReason::Unroutable => "no role or headers",
        }
    }
}

/// Decide what an envelope means for a connection currently in `current`.
///
/// Role-bearing envelopes are never routed, even if they carry headers.
pub fn classify(current: Role, envelope: &Envelope) -> Action {
    if let Some(role) = envelope.role.as_deref() {
        if current != Role::Unclassified {
            return Action::Ignore(IgnoreReason::AlreadyClassified);
        }
        return match role {
            ROLE_BACKEND => Action::ClaimBackend,
            ROLE_FRONTEND => Action::AnnounceFrontend,
            _ => Action::Ignore(IgnoreReason::UnknownRole),
        };
    }

    if envelope.headers.is_some() {
        Action::Route
    } else {
        Action::Ignore(IgnoreReason::Unroutable)
    }
}
