use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{HandshakePolicy, RelayConfig};
use crate::envelope::Envelope;
use crate::error::{RelayError, Result};
use crate::lifecycle;
use crate::outbound::OutboundHandle;
use crate::session::{ConnectionInfo, SessionId};
use crate::state::{Delivery, ForwardPlan, SharedState};

/// Plain-text reply to a frontend when no backend is installed.
pub const NO_BACKEND_MESSAGE: &str = "There is no connected backend side to the server";
/// Plain-text reply to a frontend that cannot be announced.
pub const REGISTRY_FULL_MESSAGE: &str = "Session registry is full";
/// `error` value of the negative acknowledgement sent to the backend.
pub const UNKNOWN_SESSION_ERROR: &str = "unknown socket_id";

/// Moves envelopes between frontends and the backend.
#[derive(Debug, Clone)]
pub(crate) struct Router {
    state: SharedState,
    config: Arc<RelayConfig>,
}

impl Router {
    pub(crate) fn new(state: SharedState, config: Arc<RelayConfig>) -> Self {
        Self { state, config }
    }

    /// Forward a frontend envelope to the backend, announcing the session
    /// first if the backend has not seen it yet.
    ///
    /// `reply` is the frontend's own outbound queue, used for error notices.
    pub(crate) async fn from_frontend(
        &self,
        conn: &ConnectionInfo,
        reply: &OutboundHandle,
        mut envelope: Envelope,
    ) -> Result<()> {
        let meta = conn.metadata();
        envelope.stamp(&meta);
        let payload = envelope.to_bytes()?;
        let await_ack = self.config.handshake.awaits_ack();

        loop {
            let plan = self.state.lock().plan_forward(conn.id, await_ack);
            match plan {
                ForwardPlan::NoBackend => {
                    debug!(session = %conn.id, "no backend installed; refusing envelope");
                    return reply.send(Bytes::from_static(NO_BACKEND_MESSAGE.as_bytes())).await;
                }
                ForwardPlan::RegistryFull(err) => {
                    warn!(session = %conn.id, error = %err, "cannot announce session");
                    return reply
                        .send(Bytes::from_static(REGISTRY_FULL_MESSAGE.as_bytes()))
                        .await;
                }
                ForwardPlan::Forward { backend } => {
                    if !self.config.forward_delay.is_zero() {
                        tokio::time::sleep(self.config.forward_delay).await;
                    }
                    debug!(session = %conn.id, size = payload.len(), "forwarding to backend");
                    return backend.send(payload).await;
                }
                ForwardPlan::Announce { backend, ack } => {
                    let notice = lifecycle::connect_notice(&meta).to_bytes()?;
                    backend.send(notice).await?;
                    info!(
                        session = %conn.id,
                        peer = %conn.peer,
                        backend = %backend.id(),
                        "session announced"
                    );

                    self.await_handshake(conn.id, ack).await;

                    let current = self.state.lock().backend();
                    match current {
                        Some(id) if id == backend.id() => {
                            debug!(session = %conn.id, size = payload.len(), "forwarding to backend");
                            return backend.send(payload).await;
                        }
                        Some(other) => {
                            debug!(
                                session = %conn.id,
                                backend = %other,
                                "backend replaced during handshake; announcing again"
                            );
                        }
                        None => {
                            debug!(session = %conn.id, "backend left during handshake");
                            return reply
                                .send(Bytes::from_static(NO_BACKEND_MESSAGE.as_bytes()))
                                .await;
                        }
                    }
                }
            }
        }
    }

    async fn await_handshake(&self, id: SessionId, ack: Option<oneshot::Receiver<()>>) {
        match self.config.handshake {
            HandshakePolicy::Ack { timeout } => {
                let Some(ack) = ack else {
                    return;
                };
                match tokio::time::timeout(timeout, ack).await {
                    Ok(Ok(())) => debug!(session = %id, "backend acknowledged session"),
                    Ok(Err(_)) => debug!(session = %id, "backend released before acknowledging"),
                    Err(_) => {
                        self.state.lock().cancel_ack(id);
                        warn!(
                            session = %id,
                            timeout_ms = timeout.as_millis() as u64,
                            "no connect acknowledgement; forwarding anyway"
                        );
                    }
                }
            }
            HandshakePolicy::Settle { delay } => tokio::time::sleep(delay).await,
            HandshakePolicy::Immediate => {}
        }
    }

    /// Deliver a backend envelope, byte for byte, to the session named in
    /// `headers.socket_id`.
    ///
    /// `raw` is the payload exactly as the backend framed it; `reply` is the
    /// backend's own outbound queue.
    pub(crate) fn from_backend(
        &self,
        conn: &ConnectionInfo,
        reply: &OutboundHandle,
        envelope: &Envelope,
        raw: Bytes,
    ) -> Result<()> {
        let Some(target) = envelope.socket_id() else {
            debug!(backend = %conn.id, "backend envelope without socket_id dropped");
            return Ok(());
        };

        let delivery = self
            .state
            .lock()
            .resolve_delivery(target, lifecycle::is_connect_ack(envelope));
        match delivery {
            Delivery::Acknowledged => {
                debug!(session = %target, "connect acknowledgement consumed");
                Ok(())
            }
            Delivery::Frontend(frontend) => {
                let size = raw.len();
                match frontend.try_send(raw) {
                    Ok(()) => {
                        debug!(session = %target, size, "delivered to frontend");
                    }
                    Err(RelayError::QueueFull(_)) => {
                        warn!(session = %target, size, "frontend queue full; dropping backend envelope");
                    }
                    Err(err) => {
                        debug!(session = %target, error = %err, "frontend closed before delivery");
                    }
                }
                Ok(())
            }
            Delivery::Unknown if self.config.nack_unknown_sessions => {
                debug!(session = %target, "no open session; sending negative acknowledgement");
                reply.try_send(unknown_session_nack(target)?)
            }
            Delivery::Unknown => {
                debug!(session = %target, "no open session; dropping backend envelope");
                Ok(())
            }
        }
    }
}

fn unknown_session_nack(target: SessionId) -> Result<Bytes> {
    let nack = serde_json::json!({
        "headers": { "socket_id": target.get() },
        "error": UNKNOWN_SESSION_ERROR,
    });
    Ok(Bytes::from(serde_json::to_vec(&nack)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::outbound::OutboundFrame;

    struct Harness {
        router: Router,
        state: SharedState,
    }

    fn harness(config: RelayConfig) -> Harness {
        let state = SharedState::new(config.registry_capacity);
        Harness {
            router: Router::new(state.clone(), Arc::new(config)),
            state,
        }
    }

    fn connection(
        state: &SharedState,
        raw: u64,
    ) -> (ConnectionInfo, OutboundHandle, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(16);
        let id = SessionId::new(raw);
        let info = ConnectionInfo::new(id, format!("127.0.0.1:{}", 50000 + raw).parse().unwrap());
        let handle = OutboundHandle::new(id, tx);
        state.lock().attach(info.clone(), handle.clone());
        (info, handle, rx)
    }

    fn payload(frame: Option<OutboundFrame>) -> Bytes {
        match frame {
            Some(OutboundFrame::Payload(bytes)) => bytes,
            other => panic!("expected payload, got {other:?}"),
        }
    }

    fn json_of(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn immediate() -> RelayConfig {
        RelayConfig::default().with_handshake(HandshakePolicy::Immediate)
    }

    #[tokio::test]
    async fn announce_precedes_first_envelope_only() {
        let h = harness(immediate());
        let (_backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, _front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out);

        let env = Envelope::parse(br#"{"headers":{"socket_id":77},"url":"/x","method":"GET"}"#).unwrap();
        h.router.from_frontend(&front, &front_out, env.clone()).await.unwrap();
        h.router.from_frontend(&front, &front_out, env).await.unwrap();

        let meta = json!({"socket_id": 2, "port": 50002, "address": "127.0.0.1"});
        assert_eq!(
            json_of(&payload(backend_rx.recv().await)),
            json!({"headers": meta, "url": "/connect", "method": "POST"})
        );
        assert_eq!(
            json_of(&payload(backend_rx.recv().await)),
            json!({"headers": meta, "url": "/x", "method": "GET"})
        );
        assert_eq!(
            json_of(&payload(backend_rx.recv().await)),
            json!({"headers": meta, "url": "/x", "method": "GET"})
        );
        assert!(backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_backend_replies_to_frontend() {
        let h = harness(immediate());
        let (front, front_out, mut front_rx) = connection(&h.state, 2);

        let env = Envelope::parse(br#"{"headers":{}}"#).unwrap();
        h.router.from_frontend(&front, &front_out, env).await.unwrap();

        assert_eq!(payload(front_rx.recv().await).as_ref(), NO_BACKEND_MESSAGE.as_bytes());
        assert!(h.state.registered_sessions().is_empty());
    }

    #[tokio::test]
    async fn registry_full_replies_to_frontend() {
        let h = harness(immediate().with_registry_capacity(1));
        let (_b, backend_out, _backend_rx) = connection(&h.state, 1);
        let (first, first_out, _first_rx) = connection(&h.state, 2);
        let (second, second_out, mut second_rx) = connection(&h.state, 3);
        h.state.lock().claim_backend(backend_out);

        let env = Envelope::parse(br#"{"headers":{}}"#).unwrap();
        h.router.from_frontend(&first, &first_out, env.clone()).await.unwrap();
        h.router.from_frontend(&second, &second_out, env).await.unwrap();

        assert_eq!(payload(second_rx.recv().await).as_ref(), REGISTRY_FULL_MESSAGE.as_bytes());
        assert_eq!(h.state.registered_sessions(), vec![SessionId::new(2)]);
    }

    #[tokio::test]
    async fn backend_reply_delivered_verbatim() {
        let h = harness(immediate());
        let (backend, backend_out, _backend_rx) = connection(&h.state, 1);
        let (_front, _front_out, mut front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out.clone());

        let raw = Bytes::from_static(br#"{"headers":{"socket_id":2},  "body":"ok"}"#);
        let env = Envelope::parse(&raw).unwrap();
        h.router.from_backend(&backend, &backend_out, &env, raw.clone()).unwrap();

        assert_eq!(payload(front_rx.recv().await), raw);
    }

    #[tokio::test]
    async fn unknown_session_dropped_or_nacked() {
        let raw = Bytes::from_static(br#"{"headers":{"socket_id":99},"body":"ok"}"#);
        let env = Envelope::parse(&raw).unwrap();

        let silent = harness(immediate());
        let (backend, backend_out, mut backend_rx) = connection(&silent.state, 1);
        silent.state.lock().claim_backend(backend_out.clone());
        silent
            .router
            .from_backend(&backend, &backend_out, &env, raw.clone())
            .unwrap();
        assert!(backend_rx.try_recv().is_err());

        let nacking = harness(immediate().with_nack_unknown_sessions(true));
        let (backend, backend_out, mut backend_rx) = connection(&nacking.state, 1);
        nacking.state.lock().claim_backend(backend_out.clone());
        nacking
            .router
            .from_backend(&backend, &backend_out, &env, raw)
            .unwrap();
        assert_eq!(
            json_of(&payload(backend_rx.recv().await)),
            json!({"headers": {"socket_id": 99}, "error": "unknown socket_id"})
        );
    }

    #[tokio::test]
    async fn ack_releases_pending_forward() {
        let h = harness(RelayConfig::default().with_handshake(HandshakePolicy::Ack {
            timeout: Duration::from_secs(10),
        }));
        let (backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, mut front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out.clone());

        let router = h.router.clone();
        let env = Envelope::parse(br#"{"headers":{},"url":"/x"}"#).unwrap();
        let forward = tokio::spawn(async move { router.from_frontend(&front, &front_out, env).await });

        let notice = json_of(&payload(backend_rx.recv().await));
        assert_eq!(notice["url"], "/connect");
        assert!(tokio::time::timeout(Duration::from_millis(50), backend_rx.recv())
            .await
            .is_err());

        let ack_raw = Bytes::from_static(br#"{"headers":{"socket_id":2},"url":"/connect"}"#);
        let ack = Envelope::parse(&ack_raw).unwrap();
        h.router.from_backend(&backend, &backend_out, &ack, ack_raw).unwrap();

        forward.await.unwrap().unwrap();
        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/x");
        assert!(front_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ack_timeout_forwards_anyway() {
        let h = harness(RelayConfig::default().with_handshake(HandshakePolicy::Ack {
            timeout: Duration::from_millis(20),
        }));
        let (_backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, _front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out);

        let env = Envelope::parse(br#"{"headers":{},"url":"/late"}"#).unwrap();
        h.router.from_frontend(&front, &front_out, env).await.unwrap();

        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/connect");
        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/late");
        assert!(!matches!(
            h.state.lock().resolve_delivery(SessionId::new(2), true),
            Delivery::Acknowledged
        ));
    }

    fn ack_config() -> RelayConfig {
        RelayConfig::default().with_handshake(HandshakePolicy::Ack {
            timeout: Duration::from_secs(10),
        })
    }

    #[tokio::test]
    async fn backend_replaced_during_handshake_gets_fresh_announce() {
        let h = harness(ack_config());
        let (_first, first_out, mut first_rx) = connection(&h.state, 1);
        let (second, second_out, mut second_rx) = connection(&h.state, 2);
        let (front, front_out, mut front_rx) = connection(&h.state, 3);
        h.state.lock().claim_backend(first_out);

        let router = h.router.clone();
        let env = Envelope::parse(br#"{"headers":{},"url":"/x"}"#).unwrap();
        let forward = tokio::spawn(async move { router.from_frontend(&front, &front_out, env).await });

        assert_eq!(json_of(&payload(first_rx.recv().await))["url"], "/connect");
        {
            let mut state = h.state.lock();
            assert_eq!(state.release_backend(SessionId::new(1)), Some(1));
            state.claim_backend(second_out.clone());
        }

        let notice = json_of(&payload(second_rx.recv().await));
        assert_eq!(notice["url"], "/connect");
        assert_eq!(notice["headers"]["socket_id"], 3);

        let ack_raw = Bytes::from_static(br#"{"headers":{"socket_id":3},"url":"/connect"}"#);
        let ack = Envelope::parse(&ack_raw).unwrap();
        h.router.from_backend(&second, &second_out, &ack, ack_raw).unwrap();

        forward.await.unwrap().unwrap();
        assert_eq!(json_of(&payload(second_rx.recv().await))["url"], "/x");
        assert!(first_rx.try_recv().is_err());
        assert!(front_rx.try_recv().is_err());
        assert_eq!(h.state.registered_sessions(), vec![SessionId::new(3)]);
    }

    #[tokio::test]
    async fn backend_gone_during_handshake_replies_no_backend() {
        let h = harness(ack_config());
        let (_backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, mut front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out);

        let router = h.router.clone();
        let env = Envelope::parse(br#"{"headers":{},"url":"/x"}"#).unwrap();
        let forward = tokio::spawn(async move { router.from_frontend(&front, &front_out, env).await });

        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/connect");
        h.state.lock().release_backend(SessionId::new(1));

        forward.await.unwrap().unwrap();
        assert_eq!(payload(front_rx.recv().await).as_ref(), NO_BACKEND_MESSAGE.as_bytes());
        assert!(backend_rx.try_recv().is_err());
        assert!(h.state.registered_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settle_and_forward_delay_pace_envelopes() {
        let h = harness(RelayConfig::legacy());
        let (_backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, _front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out);
        let start = tokio::time::Instant::now();

        let first = Envelope::parse(br#"{"headers":{},"n":1}"#).unwrap();
        h.router.from_frontend(&front, &front_out, first).await.unwrap();
        let settled = start.elapsed();
        assert!(settled >= Duration::from_secs(1), "settled after {settled:?}");
        assert!(settled < Duration::from_millis(1050), "settled after {settled:?}");

        let second = Envelope::parse(br#"{"headers":{},"n":2}"#).unwrap();
        h.router.from_frontend(&front, &front_out, second).await.unwrap();
        let throttled = start.elapsed() - settled;
        assert!(throttled >= Duration::from_millis(50), "throttled for {throttled:?}");
        assert!(throttled < Duration::from_millis(100), "throttled for {throttled:?}");

        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/connect");
        assert_eq!(json_of(&payload(backend_rx.recv().await))["n"], 1);
        assert_eq!(json_of(&payload(backend_rx.recv().await))["n"], 2);
        assert!(backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_string_url_is_forwarded_untouched() {
        let h = harness(immediate());
        let (_backend, backend_out, mut backend_rx) = connection(&h.state, 1);
        let (front, front_out, _front_rx) = connection(&h.state, 2);
        h.state.lock().claim_backend(backend_out);

        let env = Envelope::parse(br#"{"headers":{},"url":42,"method":["GET"]}"#).unwrap();
        h.router.from_frontend(&front, &front_out, env).await.unwrap();

        assert_eq!(json_of(&payload(backend_rx.recv().await))["url"], "/connect");
        let forwarded = json_of(&payload(backend_rx.recv().await));
        assert_eq!(forwarded["url"], 42);
        assert_eq!(forwarded["method"], json!(["GET"]));
    }
}
