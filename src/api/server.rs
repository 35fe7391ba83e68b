//! HTTP server lifecycle: bind → spawn → shutdown handle.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::api::router::portal_router;
use crate::api::types::ApiContext;

/// Handle to a running portal server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ApiServer {
    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Portal server shutdown signal sent");
        }
    }

    /// Wait for the serve task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Bind the configured address and spawn the server in a background
/// task. Returns a handle with the bound address (useful with port 0)
/// and a shutdown channel.
pub async fn start_server(ctx: ApiContext) -> Result<ApiServer, String> {
    let listener = tokio::net::TcpListener::bind(ctx.config.bind_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", ctx.config.bind_addr))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to read bound address: {e}"))?;

    tracing::info!(%addr, "Portal server binding");

    let app = portal_router(ctx);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Portal server exited with error");
        }
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}
