//! Single-backend, multi-frontend TCP relay.
//!
//! One backend connection serves many frontend connections through a single
//! relay process. Frontends never talk to the backend directly: the relay
//! tags their messages with a session id and peer address, and routes the
//! backend's replies back by that id.
//!
//! # Crate Structure
//!
//! - [`transport`]: listening socket setup and accept
//! - [`frame`]: newline, length-prefixed and JSON-stream framing
//! - [`relay`]: role negotiation, session registry and routing

/// Re-export transport types.
pub mod transport {
    pub use tcprelay_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tcprelay_frame::*;
}

/// Re-export relay types.
pub mod relay {
    pub use tcprelay_core::*;
}
