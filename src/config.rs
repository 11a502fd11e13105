//! Runtime settings. There is no configuration surface; the defaults are
//! what the exporter runs with.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the exporter listens on.
pub const DEFAULT_LISTEN_PORT: u16 = 9101;

/// Port of the legacy Kasa local protocol.
pub const DEFAULT_DEVICE_PORT: u16 = 9999;

/// Upper bound for one exchange with a device.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings of the whole exporter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Address of the HTTP listener, `0.0.0.0:9101`.
    pub listen_addr: SocketAddr,
    /// Settings handed to the device client.
    pub device: DeviceConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            device: DeviceConfig::default(),
        }
    }
}

/// Settings of the device client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Used when a target does not name a port itself.
    pub port: u16,
    /// Upper bound for one request/response exchange with a device.
    pub timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DEVICE_PORT,
            timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }
}
