use tcprelay_core::RelayServer;
use tracing::info;

use crate::args::RelayArgs;
use crate::exit::{io_error, relay_error, CliError, CliResult, SUCCESS};

/// Run the relay until Ctrl-C.
pub fn run(args: RelayArgs) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    let addr = args.bind_addr();
    let config = args.relay_config();

    runtime.block_on(async move {
        let server = RelayServer::bind(addr, config)
            .await
            .map_err(|err| relay_error("bind failed", err))?;

        server
            .run_until(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "signal handler unavailable; running until killed");
                    std::future::pending::<()>().await;
                }
            })
            .await;

        info!("relay stopped");
        Ok::<_, CliError>(SUCCESS)
    })
}
