use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Args, ValueEnum};
use tcprelay_core::{
    HandshakePolicy, RelayConfig, DEFAULT_OUTBOUND_QUEUE, DEFAULT_REGISTRY_CAPACITY,
};
use tcprelay_frame::{FrameMode, DEFAULT_MAX_PAYLOAD};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// One JSON message per line.
    Lines,
    /// "TR" magic and a 4-byte little-endian length before each message.
    Length,
    /// Bare JSON values back to back.
    Json,
}

impl From<Framing> for FrameMode {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Lines => FrameMode::Lines,
            Framing::Length => FrameMode::LengthPrefixed,
            Framing::Json => FrameMode::JsonStream,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Handshake {
    /// Wait for the backend to echo `/connect`, up to --handshake-timeout.
    Ack,
    /// Sleep --handshake-timeout after `/connect`.
    Settle,
    /// Forward right after `/connect`.
    Immediate,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Address to listen on.
    pub bind_ip: IpAddr,
    /// Port to listen on.
    pub bind_port: u16,

    /// Message framing shared by every peer.
    #[arg(long, value_name = "MODE", default_value = "lines", env = "TCPRELAY_FRAMING")]
    pub framing: Framing,

    /// Largest accepted message, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD, env = "TCPRELAY_MAX_FRAME_SIZE")]
    pub max_frame_size: usize,

    /// Most sessions announced to one backend.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_REGISTRY_CAPACITY, env = "TCPRELAY_MAX_SESSIONS")]
    pub max_sessions: usize,

    /// Outbound messages buffered per connection.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_OUTBOUND_QUEUE, env = "TCPRELAY_QUEUE_DEPTH")]
    pub queue_depth: usize,

    /// What happens between `/connect` and a session's first message.
    #[arg(long, value_name = "POLICY", default_value = "ack", env = "TCPRELAY_HANDSHAKE")]
    pub handshake: Handshake,

    /// Ack wait or settle delay (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "1s", value_parser = parse_duration, env = "TCPRELAY_HANDSHAKE_TIMEOUT")]
    pub handshake_timeout: Duration,

    /// Pause before forwarding each message of a known session (e.g. 50ms).
    #[arg(long, value_name = "DURATION", default_value = "0ms", value_parser = parse_duration, env = "TCPRELAY_FORWARD_DELAY")]
    pub forward_delay: Duration,

    /// Answer backend messages for closed sessions with an error.
    #[arg(long, env = "TCPRELAY_NACK_UNKNOWN_SESSIONS")]
    pub nack_unknown_sessions: bool,
}

impl RelayArgs {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.bind_port)
    }

    pub fn relay_config(&self) -> RelayConfig {
        let handshake = match self.handshake {
            Handshake::Ack => HandshakePolicy::Ack {
                timeout: self.handshake_timeout,
            },
            Handshake::Settle => HandshakePolicy::Settle {
                delay: self.handshake_timeout,
            },
            Handshake::Immediate => HandshakePolicy::Immediate,
        };

        let mut config = RelayConfig::default()
            .with_frame_mode(self.framing.into())
            .with_handshake(handshake)
            .with_registry_capacity(self.max_sessions)
            .with_forward_delay(self.forward_delay)
            .with_nack_unknown_sessions(self.nack_unknown_sessions);
        config.frame.max_payload_size = self.max_frame_size;
        config.outbound_queue = self.queue_depth;
        config
    }
}

/// Parse `500ms`, `2s` or a bare number of seconds. Zero is allowed.
fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_units_and_zero() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn framing_maps_to_frame_mode() {
        assert_eq!(FrameMode::from(Framing::Lines), FrameMode::Lines);
        assert_eq!(FrameMode::from(Framing::Length), FrameMode::LengthPrefixed);
        assert_eq!(FrameMode::from(Framing::Json), FrameMode::JsonStream);
    }
}
