use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tcprelay_transport::TcpTransport;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::connection::handle_connection;
use crate::error::Result;
use crate::session::SessionIdAllocator;
use crate::state::SharedState;

/// Pause after a failed accept so a persistent error (fd exhaustion) does
/// not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and spawns one handler per socket.
pub struct RelayServer {
    transport: TcpTransport,
    state: SharedState,
    config: Arc<RelayConfig>,
    ids: SessionIdAllocator,
}

impl RelayServer {
    /// Bind the listening socket described by `addr` and `config.bind`.
    pub async fn bind(addr: SocketAddr, config: RelayConfig) -> Result<Self> {
        let transport = TcpTransport::bind_with_options(addr, &config.bind).await?;
        Ok(Self {
            transport,
            state: SharedState::new(config.registry_capacity),
            config: Arc::new(config),
            ids: SessionIdAllocator::new(),
        })
    }

    /// Bound address; useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Handle on the shared relay state.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accept forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Accept until `shutdown` resolves. Handlers already running are left
    /// to finish on their own; dropping the runtime closes their sockets.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            addr = %self.local_addr(),
            transport = self.transport.transport_name(),
            framing = self.config.frame.mode.name(),
            handshake = self.config.handshake.name(),
            "relay accepting connections"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; no longer accepting");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(accepted) => {
                        let id = self.ids.next_id();
                        tokio::spawn(handle_connection(
                            accepted,
                            id,
                            self.state.clone(),
                            Arc::clone(&self.config),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }
}
