//! Application run modes

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::OrchestratorError;
use crate::orchestrate::{VerifyOutcome, VerifyRequest};
use crate::progress::{self, ProgressRecord};
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the local HTTP server until the shutdown signal
pub async fn run_server(
    version: String,
    options: AppOptions,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    info!("Initializing shipcheck {} server...", version);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let server_state = Arc::new(ServerState::new(state.orchestrator.clone()));
    let (addr, server_handle) = serve(&options.server, server_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;
    info!("Listening on http://{}", addr);

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");
    let _ = shutdown_tx.send(());

    // In-flight orchestrations are given a bounded time to finish
    let result = match tokio::time::timeout(options.max_shutdown_delay, server_handle).await {
        Ok(joined) => joined.map_err(|e| OrchestratorError::ServerError(e.to_string()))?,
        Err(_) => {
            error!(
                "Shutdown timed out after {:?}, abandoning in-flight requests",
                options.max_shutdown_delay
            );
            Ok(())
        }
    };

    state.shutdown().await;
    info!("Shutdown complete");
    result
}

/// Run one orchestration, handing every progress record to `on_record`.
///
/// Resolving `shutdown_signal` first abandons the orchestration and stops the
/// project's containers.
pub async fn run_once(
    state: &AppState,
    request: VerifyRequest,
    shutdown_signal: impl Future<Output = ()>,
    mut on_record: impl FnMut(&ProgressRecord),
) -> Result<VerifyOutcome, OrchestratorError> {
    info!(
        "Verifying {} from {}",
        request.project_id,
        request.project_dir.display()
    );

    let (sink, stream) = progress::channel(&request.project_id);
    let consume = stream.for_each(|record| {
        on_record(&record);
        futures::future::ready(())
    });

    let (result, ()) = tokio::join!(
        state.orchestrator.verify_until(request, sink, shutdown_signal),
        consume
    );
    result
}
