use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tplink_exporter::config::ExporterConfig;
use tplink_exporter::device::KasaClient;
use tplink_exporter::exporter::Exporter;
use tplink_exporter::runtime::RuntimeExporter;
use tplink_exporter::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tplink_exporter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ExporterConfig::default();
    tracing::debug!(?config, "starting");

    let exporter = Arc::new(Exporter::new(Arc::new(KasaClient::new(config.device.clone()))));
    let runtime = Arc::new(RuntimeExporter::new());

    server::serve(&config, server::router(exporter, runtime))
        .await
        .with_context(|| format!("serving on {}", config.listen_addr))
}
