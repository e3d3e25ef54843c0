//! TCP transport for tcprelay.
//!
//! This is the lowest layer of tcprelay. It owns listening-socket setup
//! (address reuse, backlog) and hands accepted streams, together with the
//! peer address they came from, to the layers above.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{AcceptedStream, BindOptions, TcpTransport};
