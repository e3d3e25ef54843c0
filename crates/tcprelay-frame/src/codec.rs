use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tracing::debug;

use crate::error::{FrameError, Result};

/// Length-prefixed header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "TR" (0x54 0x52).
pub const MAGIC: [u8; 2] = [0x54, 0x52];

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// How message boundaries are marked on the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// One message per `\n`-terminated line.
    #[default]
    Lines,
    /// Magic + 4-byte little-endian length header before each payload.
    LengthPrefixed,
    /// Back-to-back JSON values; each complete top-level value is a message.
    JsonStream,
}

impl FrameMode {
    /// Short name used in logs and CLI help.
    pub fn name(self) -> &'static str {
        match self {
            FrameMode::Lines => "lines",
            FrameMode::LengthPrefixed => "length",
            FrameMode::JsonStream => "json",
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Boundary marking used on every connection of a relay.
    pub mode: FrameMode,
    /// Maximum payload size in bytes. Default: 1 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            mode: FrameMode::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Encode a payload into the wire format for `mode`.
///
/// Wire formats:
/// ```text
/// Lines:          <payload> 0x0A
/// LengthPrefixed: ┌────────────┬─────────────┬──────────────────┐
///                 │ Magic (2B) │ Length      │ Payload          │
///                 │ 0x54 0x52  │ (4B LE)     │ (Length bytes)   │
///                 └────────────┴─────────────┴──────────────────┘
/// JsonStream:     <payload>   (self-delimiting, written as-is)
/// ```
pub fn encode_frame(mode: FrameMode, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    match mode {
        FrameMode::Lines => {
            if payload.contains(&b'\n') {
                return Err(FrameError::DelimiterInPayload);
            }
            dst.reserve(payload.len() + 1);
            dst.put_slice(payload);
            dst.put_u8(b'\n');
        }
        FrameMode::LengthPrefixed => {
            if payload.len() > u32::MAX as usize {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max: u32::MAX as usize,
                });
            }
            dst.reserve(HEADER_SIZE + payload.len());
            dst.put_slice(&MAGIC);
            dst.put_u32_le(payload.len() as u32);
            dst.put_slice(payload);
        }
        FrameMode::JsonStream => dst.extend_from_slice(payload),
    }
    Ok(())
}

/// Incremental frame decoder.
///
/// Remembers how far into the buffer it has already looked, so bytes that
/// trickle in one read at a time are examined once rather than on every
/// call. Feed it the same buffer until it yields a frame.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    mode: FrameMode,
    max_payload: usize,
    scan: Scan,
}

/// Progress through a partial frame at the front of the buffer.
#[derive(Debug, Clone, Copy, Default)]
struct Scan {
    /// Bytes already examined.
    offset: usize,
    /// Open `{`/`[` count for JSON stream mode.
    depth: usize,
    in_string: bool,
    escaped: bool,
}

enum JsonScan {
    Complete(usize),
    Incomplete,
    Malformed(serde_json::Error),
}

impl FrameDecoder {
    /// Create a decoder for `config.mode`.
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            mode: config.mode,
            max_payload: config.max_payload_size,
            scan: Scan::default(),
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Decode one frame from the buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
    /// On success, consumes the frame bytes (and any delimiter) from the buffer.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.mode {
            FrameMode::Lines => self.decode_line(src),
            FrameMode::LengthPrefixed => decode_prefixed(src, self.max_payload),
            FrameMode::JsonStream => self.decode_json_value(src),
        }
    }

    /// Decode whatever is left once the peer has closed its side.
    ///
    /// An unterminated trailing line or JSON fragment is handed up as a final
    /// frame; a truncated length-prefixed frame is an error.
    pub fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.scan = Scan::default();
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }

        match self.mode {
            FrameMode::LengthPrefixed => Err(FrameError::ConnectionClosed),
            FrameMode::Lines | FrameMode::JsonStream => {
                if src.len() > self.max_payload {
                    return Err(FrameError::PayloadTooLarge {
                        size: src.len(),
                        max: self.max_payload,
                    });
                }
                let mut rest = src.split();
                if rest.last() == Some(&b'\r') {
                    rest.truncate(rest.len() - 1);
                }
                Ok(Some(rest.freeze()))
            }
        }
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let start = self.scan.offset.min(src.len());
            let Some(found) = src[start..].iter().position(|b| *b == b'\n') else {
                self.scan.offset = src.len();
                // Leave room for a trailing '\r' that is stripped on completion.
                if src.len() > self.max_payload.saturating_add(1) {
                    return Err(FrameError::PayloadTooLarge {
                        size: src.len(),
                        max: self.max_payload,
                    });
                }
                return Ok(None); // Need more data
            };
            self.scan = Scan::default();

            let pos = start + found;
            let mut line = src.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_payload {
                return Err(FrameError::PayloadTooLarge {
                    size: line.len(),
                    max: self.max_payload,
                });
            }
            return Ok(Some(line.freeze()));
        }
    }

    fn decode_json_value(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.scan.offset == 0 {
            match src.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(start) => src.advance(start),
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
            if !matches!(src[0], b'{' | b'[' | b'"') {
                return self.decode_json_scalar(src);
            }
        }

        let Some(end) = self.scan_json(&src[..]) else {
            if src.len() > self.max_payload {
                return Err(FrameError::PayloadTooLarge {
                    size: src.len(),
                    max: self.max_payload,
                });
            }
            return Ok(None); // Need more data
        };
        self.scan = Scan::default();
        if end > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: end,
                max: self.max_payload,
            });
        }
        Ok(Some(src.split_to(end).freeze()))
    }

    /// Continue a structural scan of the object, array or string at the
    /// front of `src`. Returns the end offset once its closing byte arrives.
    fn scan_json(&mut self, src: &[u8]) -> Option<usize> {
        let scan = &mut self.scan;
        for (i, &b) in src.iter().enumerate().skip(scan.offset) {
            if scan.in_string {
                if scan.escaped {
                    scan.escaped = false;
                } else if b == b'\\' {
                    scan.escaped = true;
                } else if b == b'"' {
                    scan.in_string = false;
                    if scan.depth == 0 {
                        return Some(i + 1);
                    }
                }
                continue;
            }
            match b {
                b'"' => scan.in_string = true,
                b'{' | b'[' => scan.depth += 1,
                b'}' | b']' => {
                    scan.depth = scan.depth.saturating_sub(1);
                    if scan.depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        scan.offset = src.len();
        None
    }

    /// Top-level scalars and garbage. These are at most a few bytes before
    /// the parser either completes or rejects them, so a fresh parse is cheap.
    fn decode_json_scalar(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let scan = {
            let mut values = serde_json::Deserializer::from_slice(&src[..]).into_iter::<IgnoredAny>();
            match values.next() {
                Some(Ok(_)) => JsonScan::Complete(values.byte_offset()),
                Some(Err(err)) if err.is_eof() => JsonScan::Incomplete,
                Some(Err(err)) => JsonScan::Malformed(err),
                None => JsonScan::Incomplete,
            }
        };

        match scan {
            JsonScan::Complete(end) => Ok(Some(src.split_to(end).freeze())),
            JsonScan::Incomplete => {
                if src.len() > self.max_payload {
                    return Err(FrameError::PayloadTooLarge {
                        size: src.len(),
                        max: self.max_payload,
                    });
                }
                Ok(None)
            }
            JsonScan::Malformed(err) => {
                // No way to find the next value boundary; hand the bytes up so
                // the envelope parser rejects them, and resync on fresh input.
                debug!(error = %err, size = src.len(), "discarding malformed json stream bytes");
                Ok(Some(src.split().freeze()))
            }
        }
    }
}

fn decode_prefixed(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}
