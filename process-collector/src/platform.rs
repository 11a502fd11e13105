use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::gauge::ConstGauge,
};

/// Reports the platform the exporter runs on as a constant `platform_info`
/// gauge, labeled with operating system, architecture, OS family and the
/// version of the running program.
#[derive(Debug)]
pub struct PlatformCollector {
    version: String,
}

impl PlatformCollector {
    /// Report `version` as the version of the running program.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Collector for PlatformCollector {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        let gauge = ConstGauge::new(1i64);
        let mut metric_encoder = encoder.encode_descriptor(
            "platform_info",
            "Platform information of the running process.",
            None,
            gauge.metric_type(),
        )?;

        let labels = [
            ("os", std::env::consts::OS),
            ("arch", std::env::consts::ARCH),
            ("family", std::env::consts::FAMILY),
            ("version", self.version.as_str()),
        ];
        let family_encoder = metric_encoder.encode_family(&labels)?;
        gauge.encode(family_encoder)
    }
}
