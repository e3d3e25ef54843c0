//! Single-backend session multiplexer.
//!
//! Every connection to the relay starts unclassified. The first one to send
//! `{"role":"backend"}` takes the backend slot; later claimants are told the
//! slot is taken and closed. Every other connection is a potential
//! frontend session, identified by a relay-assigned [`SessionId`].
//!
//! Frontend envelopes are stamped with routing metadata
//! (`headers.socket_id`, `headers.port`, `headers.address`) and forwarded to
//! the backend, preceded by a synthesized `/connect` notice the first time a
//! session is seen. Backend envelopes are delivered byte for byte to the
//! session named in their `headers.socket_id`. When a session closes the
//! backend receives `/disconnect`; when the backend closes, every announced
//! session is forgotten so the next backend gets fresh `/connect` notices.
//!
//! # Crate Structure
//!
//! - [`envelope`]: the JSON message shape and routing metadata
//! - [`classifier`]: what one envelope means for its connection
//! - [`state`]: backend slot, session registry and open connections behind one lock
//! - [`server`]: accept loop spawning one handler per connection

mod connection;
mod outbound;
mod router;

pub mod classifier;
pub mod config;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod session;
pub mod slot;
pub mod state;

pub use classifier::{classify, Action, IgnoreReason};
pub use config::{HandshakePolicy, RelayConfig, DEFAULT_ACK_TIMEOUT};
pub use envelope::{Envelope, RoutingMetadata};
pub use error::{RegistryError, RelayError, Result};
pub use outbound::DEFAULT_OUTBOUND_QUEUE;
pub use registry::{SessionRegistry, DEFAULT_REGISTRY_CAPACITY};
pub use router::{NO_BACKEND_MESSAGE, REGISTRY_FULL_MESSAGE, UNKNOWN_SESSION_ERROR};
pub use server::RelayServer;
pub use session::{ConnectionInfo, Role, SessionId, SessionIdAllocator};
pub use slot::{BackendSlot, ClaimOutcome, BACKEND_TAKEN_MESSAGE};
pub use state::{RelayState, SharedState};
