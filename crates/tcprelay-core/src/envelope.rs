use std::net::IpAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionId;

/// `role` value that claims the backend slot.
pub const ROLE_BACKEND: &str = "backend";
/// `role` value announcing a frontend.
pub const ROLE_FRONTEND: &str = "frontend";

/// Header key carrying the relay session id.
pub const HEADER_SOCKET_ID: &str = "socket_id";
/// Header key carrying the frontend's peer port.
pub const HEADER_PORT: &str = "port";
/// Header key carrying the frontend's peer address.
pub const HEADER_ADDRESS: &str = "address";

/// A decoded relay message.
///
/// Only the fields the relay inspects are typed; everything else rides along
/// in `extra` and is serialized back untouched. `url` and `method` are only
/// read as strings on synthesized notices and their acks, so they keep
/// whatever JSON the sender wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Who a routed envelope belongs to, as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingMetadata {
    pub socket_id: SessionId,
    pub port: u16,
    pub address: IpAddr,
}

impl Envelope {
    /// Parse a frame payload. Anything but a JSON object is an error.
    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Serialize back to a compact JSON payload.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Session this envelope is addressed to, from `headers.socket_id`.
    ///
    /// Accepts a JSON integer or a decimal string.
    pub fn socket_id(&self) -> Option<SessionId> {
        let value = self.headers.as_ref()?.get(HEADER_SOCKET_ID)?;
        match value {
            Value::Number(n) => n.as_u64().map(SessionId::new),
            Value::String(s) => s.trim().parse().ok().map(SessionId::new),
            _ => None,
        }
    }

    /// Write routing metadata into `headers`, replacing whatever the sender
    /// put under the same keys.
    pub fn stamp(&mut self, meta: &RoutingMetadata) {
        let headers = self.headers.get_or_insert_with(Map::new);
        headers.insert(HEADER_SOCKET_ID.to_string(), Value::from(meta.socket_id.get()));
        headers.insert(HEADER_PORT.to_string(), Value::from(meta.port));
        headers.insert(
            HEADER_ADDRESS.to_string(),
            Value::from(meta.address.to_string()),
        );
    }

    /// `url` when it is a string.
    pub fn url(&self) -> Option<&str> {
        self.url.as_ref()?.as_str()
    }

    /// `method` when it is a string.
    pub fn method(&self) -> Option<&str> {
        self.method.as_ref()?.as_str()
    }

    /// Whether this envelope asks for the given role.
    pub fn declares_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}
