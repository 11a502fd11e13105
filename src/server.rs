//! HTTP front end.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ExporterConfig;
use crate::exporter::{self, Exporter};
use crate::runtime::{self, RuntimeExporter};

/// `GET /scrape` polls a device, `GET /metrics` reports on the exporter.
pub fn router(exporter: Arc<Exporter>, runtime: Arc<RuntimeExporter>) -> Router {
    Router::new()
        .route("/scrape", get(exporter::collect))
        .with_state(exporter)
        .route("/metrics", get(runtime::collect))
        .with_state(runtime)
}

/// Bind the listener and serve until the process receives SIGINT or
/// SIGTERM.
pub async fn serve(config: &ExporterConfig, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
