#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Open Metrics exporter for TP-Link Kasa smart plugs.
//!
//! Devices are polled on demand: a request to `/scrape` names a target and
//! credentials, the exporter polls that device and answers with its metrics.
//! `/metrics` reports on the exporter process itself.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tplink_exporter::config::ExporterConfig;
//! use tplink_exporter::device::KasaClient;
//! use tplink_exporter::exporter::Exporter;
//! use tplink_exporter::runtime::RuntimeExporter;
//! use tplink_exporter::server::{router, serve};
//!
//! # #[tokio::main]
//! # async fn main() -> std::io::Result<()> {
//! let config = ExporterConfig::default();
//! let exporter = Exporter::new(Arc::new(KasaClient::new(config.device.clone())));
//! let app = router(Arc::new(exporter), Arc::new(RuntimeExporter::new()));
//! serve(&config, app).await
//! # }
//! ```
//!
//! A single collector can also be driven directly:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tplink_exporter::collector::Collector;
//! # use tplink_exporter::device::{Credentials, KasaClient};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let collector = Collector::new(
//!     "192.168.1.20",
//!     Credentials::new("user", "secret"),
//!     Arc::new(KasaClient::default()),
//! );
//! collector.update_metrics().await?;
//! print!("{}", collector.encode()?);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod device;
pub mod error;
pub mod exporter;
pub mod runtime;
pub mod server;

pub use error::DeviceError;
