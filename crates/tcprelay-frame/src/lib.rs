//! Message framing for tcprelay.
//!
//! A TCP read carries no message boundaries, so every envelope travels in an
//! explicit frame. Three framings are supported:
//! - newline-delimited (the default),
//! - length-prefixed with a 2-byte magic ("TR") and a 4-byte little-endian length,
//! - self-delimiting JSON values, for peers that write bare JSON objects
//!   back to back.

pub mod codec;
pub mod error;
#[cfg(feature = "async")]
pub mod framed;

pub use codec::{
    encode_frame, FrameConfig, FrameDecoder, FrameMode, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use framed::RelayCodec;
