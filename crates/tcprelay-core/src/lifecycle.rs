//! Synthesized `/connect` and `/disconnect` notices.
//!
//! The backend never sees frontend sockets directly. It learns that a
//! session exists from a `/connect` notice sent ahead of the session's first
//! envelope, and that it is gone from a `/disconnect` notice.

use serde_json::Value;
use tracing::{debug, info};

use crate::envelope::{Envelope, RoutingMetadata};
use crate::session::ConnectionInfo;
use crate::state::SharedState;

pub const CONNECT_URL: &str = "/connect";
pub const DISCONNECT_URL: &str = "/disconnect";
pub const NOTICE_METHOD: &str = "POST";

fn notice(url: &str, meta: &RoutingMetadata) -> Envelope {
    let mut envelope = Envelope {
        url: Some(Value::from(url)),
        method: Some(Value::from(NOTICE_METHOD)),
        ..Envelope::default()
    };
    envelope.stamp(meta);
    envelope
}

pub fn connect_notice(meta: &RoutingMetadata) -> Envelope {
    notice(CONNECT_URL, meta)
}

pub fn disconnect_notice(meta: &RoutingMetadata) -> Envelope {
    notice(DISCONNECT_URL, meta)
}

/// Whether a backend envelope answers a `/connect` notice.
pub fn is_connect_ack(envelope: &Envelope) -> bool {
    envelope.url() == Some(CONNECT_URL)
}

/// Tell the backend a non-backend connection has closed and drop it from
/// the registry. Nothing is sent when no backend is installed.
pub(crate) async fn announce_disconnect(state: &SharedState, conn: &ConnectionInfo) {
    let backend = state.lock().retire(conn.id);
    let Some(backend) = backend else {
        return;
    };

    let payload = match disconnect_notice(&conn.metadata()).to_bytes() {
        Ok(payload) => payload,
        Err(err) => {
            debug!(session = %conn.id, error = %err, "failed to encode disconnect notice");
            return;
        }
    };

    match backend.send(payload).await {
        Ok(()) => info!(
            session = %conn.id,
            backend = %backend.id(),
            lifetime_ms = conn.created_at.elapsed().as_millis() as u64,
            "session retired"
        ),
        Err(err) => debug!(session = %conn.id, error = %err, "disconnect notice not delivered"),
    }
}
