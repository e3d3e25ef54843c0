//! Per-connection handler.
//!
//! Each accepted socket gets one task running [`handle_connection`]. The
//! task owns the read half and decodes frames; the write half belongs to a
//! writer task fed through the connection's outbound queue, so other
//! handlers can push to this peer without touching its socket.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tcprelay_frame::RelayCodec;
use tcprelay_transport::AcceptedStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::classifier::{classify, Action};
use crate::config::RelayConfig;
use crate::envelope::Envelope;
use crate::lifecycle;
use crate::outbound::{spawn_writer, OutboundHandle};
use crate::router::Router;
use crate::session::{ConnectionInfo, Role, SessionId};
use crate::slot::{ClaimOutcome, BACKEND_TAKEN_MESSAGE};
use crate::state::SharedState;

enum Flow {
    Continue,
    Stop,
}

struct Connection {
    info: ConnectionInfo,
    outbound: OutboundHandle,
    role: Role,
    rejected: bool,
}

/// Serve one connection until its peer closes, a read fails, or it is
/// rejected as a second backend.
pub(crate) async fn handle_connection(
    accepted: AcceptedStream,
    id: SessionId,
    state: SharedState,
    config: Arc<RelayConfig>,
) {
    let AcceptedStream { stream, peer } = accepted;
    let info = ConnectionInfo::new(id, peer);
    let (read_half, write_half) = stream.into_split();

    let codec = RelayCodec::new(config.frame.clone());
    let mut frames = FramedRead::new(read_half, codec.clone());
    let outbound = spawn_writer(id, FramedWrite::new(write_half, codec), config.outbound_queue);

    state.lock().attach(info.clone(), outbound.clone());
    info!(session = %id, peer = %peer, "connection accepted");

    let router = Router::new(state.clone(), config);
    let mut conn = Connection {
        info,
        outbound,
        role: Role::Unclassified,
        rejected: false,
    };

    while let Some(frame) = frames.next().await {
        let payload = match frame {
            Ok(payload) => payload,
            Err(err) => {
                debug!(session = %id, error = %err, "read failed; closing connection");
                break;
            }
        };
        if let Flow::Stop = conn.dispatch(&router, &state, payload).await {
            break;
        }
    }

    conn.finish(&state).await;
}

impl Connection {
    async fn dispatch(&mut self, router: &Router, state: &SharedState, payload: Bytes) -> Flow {
        let id = self.info.id;
        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(
                    session = %id,
                    error = %err,
                    raw = %String::from_utf8_lossy(&payload),
                    "ignoring malformed message"
                );
                return Flow::Continue;
            }
        };

        match classify(self.role, &envelope) {
            Action::ClaimBackend => return self.claim_backend(state).await,
            Action::AnnounceFrontend => {
                self.role = Role::Frontend;
                info!(session = %id, peer = %self.info.peer, "frontend connected");
            }
            Action::Route => {
                let is_backend = state.lock().is_backend(id);
                let routed = if is_backend {
                    router.from_backend(&self.info, &self.outbound, &envelope, payload)
                } else {
                    router.from_frontend(&self.info, &self.outbound, envelope).await
                };
                if let Err(err) = routed {
                    debug!(session = %id, error = %err, "envelope not routed");
                }
            }
            Action::Ignore(reason) => {
                debug!(session = %id, role = self.role.as_str(), reason = reason.as_str(), "ignoring message");
            }
        }
        Flow::Continue
    }

    async fn claim_backend(&mut self, state: &SharedState) -> Flow {
        let id = self.info.id;
        let outcome = state.lock().claim_backend(self.outbound.clone());
        match outcome {
            ClaimOutcome::Installed => {
                self.role = Role::Backend;
                info!(session = %id, peer = %self.info.peer, "backend installed");
                Flow::Continue
            }
            ClaimOutcome::AlreadyHeld => {
                self.role = Role::Backend;
                Flow::Continue
            }
            ClaimOutcome::Rejected { incumbent } => {
                warn!(
                    session = %id,
                    peer = %self.info.peer,
                    incumbent = %incumbent,
                    "backend slot taken; rejecting connection"
                );
                if let Err(err) = self
                    .outbound
                    .send(Bytes::from_static(BACKEND_TAKEN_MESSAGE.as_bytes()))
                    .await
                {
                    debug!(session = %id, error = %err, "rejection notice not delivered");
                }
                self.outbound.close().await;
                self.rejected = true;
                Flow::Stop
            }
        }
    }

    async fn finish(self, state: &SharedState) {
        let id = self.info.id;
        let released = {
            let mut guard = state.lock();
            guard.detach(id);
            guard.release_backend(id)
        };

        match released {
            Some(purged) => info!(session = %id, purged, "backend disconnected; sessions purged"),
            None if self.rejected => debug!(session = %id, "rejected backend closed"),
            None => lifecycle::announce_disconnect(state, &self.info).await,
        }
        info!(session = %id, role = self.role.as_str(), "connection closed");
        self.outbound.close().await;
    }
}
