//! Metrics about the exporter process itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use process_collector::{PlatformCollector, ProcessCollector};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

/// Registry of the process and platform collectors, read on every scrape.
#[derive(Debug)]
pub struct RuntimeExporter {
    registry: Registry,
}

impl RuntimeExporter {
    /// Register the process and platform collectors.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(ProcessCollector::new(None)));
        registry.register_collector(Box::new(PlatformCollector::new(env!("CARGO_PKG_VERSION"))));
        Self { registry }
    }

    /// Registry served on `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for RuntimeExporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for `GET /metrics`.
pub async fn collect(State(runtime): State<Arc<RuntimeExporter>>) -> Response {
    let mut buffer = String::new();
    match encode(&mut buffer, runtime.registry()) {
        Ok(()) => (StatusCode::OK, [(CONTENT_TYPE, "text/plain")], buffer).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
