use bytes::Bytes;
use futures_util::SinkExt;
use tcprelay_frame::{FrameError, RelayCodec};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace, warn};

use crate::error::{RelayError, Result};
use crate::session::SessionId;

/// Default depth of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Payload(Bytes),
    Close,
}

/// Cloneable handle feeding one connection's writer task.
#[derive(Debug, Clone)]
pub(crate) struct OutboundHandle {
    id: SessionId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl OutboundHandle {
    pub(crate) fn new(id: SessionId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { id, tx }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a payload, waiting for capacity.
    pub(crate) async fn send(&self, payload: Bytes) -> Result<()> {
        self.tx
            .send(OutboundFrame::Payload(payload))
            .await
            .map_err(|_| RelayError::QueueClosed(self.id))
    }

    /// Queue a payload without waiting.
    pub(crate) fn try_send(&self, payload: Bytes) -> Result<()> {
        self.tx
            .try_send(OutboundFrame::Payload(payload))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => RelayError::QueueFull(self.id),
                mpsc::error::TrySendError::Closed(_) => RelayError::QueueClosed(self.id),
            })
    }

    /// Ask the writer to flush what is queued and shut the socket down.
    pub(crate) async fn close(&self) {
        let _ = self.tx.send(OutboundFrame::Close).await;
    }
}

/// Spawn the writer task that owns `sink` for the connection's lifetime.
///
/// The task exits on `Close`, on a write error, or once every handle is
/// dropped; in all cases the write half is flushed and shut down.
pub(crate) fn spawn_writer<W>(
    id: SessionId,
    mut sink: FramedWrite<W, RelayCodec>,
    depth: usize,
) -> OutboundHandle
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(depth.max(1));

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Payload(payload) => {
                    trace!(session = %id, size = payload.len(), "writing frame");
                    match sink.send(payload).await {
                        Ok(()) => {}
                        Err(err @ (FrameError::DelimiterInPayload | FrameError::PayloadTooLarge { .. })) => {
                            warn!(session = %id, error = %err, "dropping unframeable payload");
                        }
                        Err(err) => {
                            debug!(session = %id, error = %err, "write failed; stopping writer");
                            return;
                        }
                    }
                }
                OutboundFrame::Close => break,
            }
        }
        if let Err(err) = sink.close().await {
            debug!(session = %id, error = %err, "shutdown of write half failed");
        }
    });

    OutboundHandle::new(id, tx)
}
