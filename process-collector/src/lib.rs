//! Process and platform [`Collector`]s reporting on the running exporter.
//!
//! Both collectors read their values ad-hoc on each scrape, see
//! [`prometheus_client::collector::Collector`].
//!
//! ```
//! # use prometheus_client::registry::Registry;
//! # use process_collector::{PlatformCollector, ProcessCollector};
//! let mut registry = Registry::default();
//! registry.register_collector(Box::new(ProcessCollector::new(None)));
//! registry.register_collector(Box::new(PlatformCollector::new("0.1.0")));
//! ```

#![deny(missing_docs)]

use prometheus_client::{collector::Collector, encoding::DescriptorEncoder};

#[cfg(target_os = "linux")]
mod linux;
mod platform;

pub use platform::PlatformCollector;

/// Reports CPU time, memory, file descriptors, threads and start time of the
/// current process.
///
/// Only Linux exposes the required information through `/proc`. On other
/// platforms the collector encodes nothing.
#[derive(Debug)]
pub struct ProcessCollector {
    namespace: String,
    report_error: bool,
}

impl ProcessCollector {
    /// Create a collector whose metric names are prefixed with
    /// `<namespace>_` when a namespace is given.
    pub fn new(namespace: Option<String>) -> Self {
        let namespace = match namespace {
            Some(mut n) => {
                n.push('_');
                n
            }
            None => String::new(),
        };

        Self {
            namespace,
            report_error: false,
        }
    }

    /// Fail the whole scrape when a single metric cannot be read, instead of
    /// skipping that metric.
    pub fn report_error(mut self, report_error: bool) -> Self {
        self.report_error = report_error;
        self
    }

    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn name(&self, metric: &str) -> String {
        format!("{}{}", self.namespace, metric)
    }

    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn handle_error_report(
        &self,
        result: Result<(), std::fmt::Error>,
    ) -> Result<(), std::fmt::Error> {
        if !self.report_error {
            return Ok(());
        }

        result
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Collector for ProcessCollector {
    #[cfg(target_os = "linux")]
    fn encode(&self, encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        linux::encode(self, encoder)
    }

    #[cfg(not(target_os = "linux"))]
    fn encode(&self, _encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::{encoding::text::encode, registry::Registry};

    #[test]
    fn ignore_error_report() {
        let collector = ProcessCollector::new(None);
        let result = collector.handle_error_report(Err(std::fmt::Error));
        assert!(result.is_ok(), "handle_error_report did not ignore error");
    }

    #[test]
    fn return_error() {
        let collector = ProcessCollector::new(None).report_error(true);
        let result = collector.handle_error_report(Err(std::fmt::Error));
        assert!(result.is_err(), "handle_error_report ignored error");
    }

    #[test]
    fn namespace_prefixes_names() {
        let collector = ProcessCollector::new(Some("tplink".to_string()));
        assert_eq!("tplink_process_threads", collector.name("process_threads"));
        assert_eq!("process_threads", ProcessCollector::default().name("process_threads"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn encodes_process_metrics() {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(ProcessCollector::new(None)));

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();

        assert!(buffer.contains("process_cpu_seconds_total"), "{buffer}");
        assert!(buffer.contains("process_resident_memory_bytes"), "{buffer}");
        assert!(buffer.contains("process_start_time_seconds"), "{buffer}");
        assert!(buffer.contains("process_threads"), "{buffer}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn encodes_namespaced_names() {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(ProcessCollector::new(Some(
            "tplink".to_string(),
        ))));

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();

        assert!(buffer.contains("# TYPE tplink_process_cpu_seconds counter"), "{buffer}");
        assert!(buffer.contains("tplink_process_open_fds "), "{buffer}");
        assert!(buffer.contains("tplink_process_max_fds "), "{buffer}");
        assert!(buffer.contains("tplink_process_virtual_memory_bytes "), "{buffer}");
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn encodes_nothing_off_linux() {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(ProcessCollector::new(None)));

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert_eq!("# EOF\n", buffer);
    }
}
