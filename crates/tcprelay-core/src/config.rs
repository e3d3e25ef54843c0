use std::time::Duration;

use tcprelay_frame::{FrameConfig, FrameMode};
use tcprelay_transport::BindOptions;

use crate::outbound::DEFAULT_OUTBOUND_QUEUE;
use crate::registry::DEFAULT_REGISTRY_CAPACITY;

/// Default wait for a backend to acknowledge `/connect`.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);
/// Fixed pause after `/connect` used by older relays.
pub const LEGACY_SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Fixed pause before each forward used by older relays.
pub const LEGACY_FORWARD_DELAY: Duration = Duration::from_millis(50);

/// What happens between a `/connect` notice and the envelope that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePolicy {
    /// Wait for the backend to answer with a `/connect` envelope for the
    /// session, up to `timeout`; forward anyway once it elapses.
    Ack { timeout: Duration },
    /// Sleep for a fixed delay.
    Settle { delay: Duration },
    /// Forward right away.
    Immediate,
}

impl HandshakePolicy {
    pub fn awaits_ack(&self) -> bool {
        matches!(self, HandshakePolicy::Ack { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandshakePolicy::Ack { .. } => "ack",
            HandshakePolicy::Settle { .. } => "settle",
            HandshakePolicy::Immediate => "immediate",
        }
    }
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        HandshakePolicy::Ack {
            timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Relay behavior configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listening-socket options.
    pub bind: BindOptions,
    /// Framing shared by every connection.
    pub frame: FrameConfig,
    /// Maximum number of sessions announced to one backend.
    pub registry_capacity: usize,
    /// Per-connection outbound queue depth.
    pub outbound_queue: usize,
    /// Connect handshake behavior.
    pub handshake: HandshakePolicy,
    /// Pause before forwarding each envelope of an already announced session.
    pub forward_delay: Duration,
    /// Tell the backend when it addresses a session that is not open.
    pub nack_unknown_sessions: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: BindOptions::default(),
            frame: FrameConfig::default(),
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            handshake: HandshakePolicy::default(),
            forward_delay: Duration::ZERO,
            nack_unknown_sessions: false,
        }
    }
}

impl RelayConfig {
    /// Timing and framing for peers that write bare JSON values and expect
    /// the old fixed pauses: 1s settle after `/connect`, 50ms per forward.
    pub fn legacy() -> Self {
        Self {
            frame: FrameConfig {
                mode: FrameMode::JsonStream,
                ..FrameConfig::default()
            },
            handshake: HandshakePolicy::Settle {
                delay: LEGACY_SETTLE_DELAY,
            },
            forward_delay: LEGACY_FORWARD_DELAY,
            ..Self::default()
        }
    }

    pub fn with_frame_mode(mut self, mode: FrameMode) -> Self {
        self.frame.mode = mode;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakePolicy) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    pub fn with_forward_delay(mut self, delay: Duration) -> Self {
        self.forward_delay = delay;
        self
    }

    pub fn with_nack_unknown_sessions(mut self, enabled: bool) -> Self {
        self.nack_unknown_sessions = enabled;
        self
    }
}
