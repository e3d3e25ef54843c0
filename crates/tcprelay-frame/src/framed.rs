use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameConfig, FrameDecoder, FrameMode};
use crate::error::{FrameError, Result};

/// `tokio_util` codec yielding one relay message payload per frame.
///
/// Each connection needs its own codec: the decoder keeps scan progress for
/// the partial frame at the front of that connection's read buffer.
#[derive(Debug, Clone)]
pub struct RelayCodec {
    config: FrameConfig,
    decoder: FrameDecoder,
}

impl RelayCodec {
    /// Create a codec with explicit configuration.
    pub fn new(config: FrameConfig) -> Self {
        let decoder = FrameDecoder::new(&config);
        Self { config, decoder }
    }

    /// Framing mode in use.
    pub fn mode(&self) -> FrameMode {
        self.config.mode
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl Decoder for RelayCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        self.decoder.decode_eof(src)
    }
}

impl Encoder<Bytes> for RelayCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(self.config.mode, &payload, dst)
    }
}
