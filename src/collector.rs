//! Per-device metric instruments and the on-demand refresh of them.
//!
//! See [`Collector`] for details.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::device::{Credentials, Device, Discover, StateInformation};
use crate::error::DeviceError;

type DeviceGauge = Family<DeviceLabels, Gauge<f64, AtomicU64>>;
type DeviceCounter = Family<DeviceLabels, Counter<f64, AtomicU64>>;

/// Label set shared by every metric of a device.
///
/// Fields the device does not report are empty strings.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeviceLabels {
    /// User-assigned name of the device.
    pub alias: String,
    /// `device_id`, or the older `deviceId`, from the system information.
    pub device_id: String,
    /// Hardware version.
    pub hw_ver: String,
    /// Firmware version.
    pub sw_ver: String,
    /// MAC address.
    pub mac: String,
    /// Model name, e.g. `HS110(EU)`.
    pub model: String,
}

/// Values of one poll, one per metric instrument.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceState {
    /// Volt.
    pub voltage: f64,
    /// Ampere.
    pub current: f64,
    /// Wifi signal strength in dBm.
    pub rssi: f64,
    /// `1.0` while the relay is closed.
    pub relay_state: f64,
    /// Always `1.0`, carries the labels.
    pub metadata: f64,
    /// `1.0` while the device reports itself on.
    pub online: f64,
    /// Seconds since the device was switched on.
    pub on_time: f64,
    /// Watt.
    pub power_load: f64,
    /// kWh consumed today.
    pub power_today: f64,
    /// kWh consumed this month.
    pub power_month: f64,
}

/// Everything one poll of a device yields.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Identity of the device.
    pub labels: DeviceLabels,
    /// Readings of the poll.
    pub state: DeviceState,
}

impl Snapshot {
    /// Derive labels and state from the current fields of `device`.
    pub fn from_device(device: &dyn Device) -> Result<Self, DeviceError> {
        let sys_info = device.sys_info();
        let hw_info = device.hw_info();
        let info = device.state_information();

        let labels = DeviceLabels {
            alias: device.alias().unwrap_or_default().to_string(),
            device_id: text(sys_info, "device_id")
                .or_else(|| text(sys_info, "deviceId"))
                .unwrap_or_default(),
            hw_ver: text(&hw_info, "hw_ver").unwrap_or_default(),
            sw_ver: text(&hw_info, "sw_ver").unwrap_or_default(),
            mac: text(&hw_info, "mac").unwrap_or_default(),
            model: device.model().to_string(),
        };

        let relay_state = match sys_info.get("relay_state") {
            Some(value) => number(value).ok_or_else(|| DeviceError::InvalidValue {
                key: "relay_state".to_string(),
                value: value.to_string(),
            })?,
            None => {
                let on = sys_info.get("device_on").map(truthy).unwrap_or(false);
                if on {
                    1.0
                } else {
                    0.0
                }
            }
        };

        let online = match info.get("State") {
            Some(state) if state.is_truthy() => 1.0,
            _ => 0.0,
        };

        let state = DeviceState {
            voltage: state_number(&info, "Voltage")?,
            current: state_number(&info, "Current")?,
            rssi: state_number(&info, "RSSI")?,
            relay_state,
            metadata: 1.0,
            online,
            on_time: uptime(info.get("On since").and_then(|v| v.as_timestamp())),
            power_load: state_number(&info, "Current consumption")?,
            power_today: state_number(&info, "Today's consumption")?,
            power_month: state_number(&info, "This month's consumption")?,
        };

        Ok(Self { labels, state })
    }
}

/// The ten instruments of a device.
#[derive(Debug, Default)]
struct DeviceMetrics {
    current: DeviceGauge,
    metadata: DeviceGauge,
    on_time: DeviceCounter,
    online: DeviceGauge,
    power_load: DeviceGauge,
    power_today: DeviceGauge,
    power_month: DeviceGauge,
    relay_state: DeviceGauge,
    rssi: DeviceGauge,
    voltage: DeviceGauge,
}

impl DeviceMetrics {
    fn register(&self, registry: &mut Registry) {
        registry.register(
            "tplink_current",
            "Current flowing through device in Ampere",
            self.current.clone(),
        );
        registry.register("tplink_metadata", "Device metadata", self.metadata.clone());
        registry.register(
            "tplink_on_time",
            "Time in seconds since online",
            self.on_time.clone(),
        );
        registry.register("tplink_online", "Device online", self.online.clone());
        registry.register(
            "tplink_power_load",
            "Current power in Watt",
            self.power_load.clone(),
        );
        registry.register(
            "tplink_power_today",
            "Energy consumed today in kWh",
            self.power_today.clone(),
        );
        registry.register(
            "tplink_power_month",
            "Energy consumed this month in kWh",
            self.power_month.clone(),
        );
        registry.register(
            "tplink_relay_state",
            "Relay state (switch on/off)",
            self.relay_state.clone(),
        );
        registry.register(
            "tplink_rssi",
            "Wifi received signal strength indicator",
            self.rssi.clone(),
        );
        registry.register(
            "tplink_voltage",
            "Current voltage connected to device in Volt",
            self.voltage.clone(),
        );
    }

    fn record(&self, snapshot: &Snapshot) {
        let Snapshot { labels, state } = snapshot;

        self.current.get_or_create(labels).set(state.current);
        self.metadata.get_or_create(labels).set(state.metadata);
        self.on_time.get_or_create(labels).inc_by(state.on_time);
        self.online.get_or_create(labels).set(state.online);
        self.power_load.get_or_create(labels).set(state.power_load);
        self.power_today.get_or_create(labels).set(state.power_today);
        self.power_month.get_or_create(labels).set(state.power_month);
        self.relay_state.get_or_create(labels).set(state.relay_state);
        self.rssi.get_or_create(labels).set(state.rssi);
        self.voltage.get_or_create(labels).set(state.voltage);
    }
}

/// Metrics of one target device, refreshed on demand.
///
/// Every [`Collector::update_metrics`] rediscovers the device with the
/// credentials the collector was created with, fetches its state and writes
/// it into the collector's own [`Registry`].
///
/// The device handle sits behind an async mutex. Polls of one target run one
/// after the other, and [`Collector::scrape`] keeps the lock until the
/// registry is rendered.
#[derive(Debug)]
pub struct Collector {
    host: String,
    credentials: Credentials,
    client: Arc<dyn Discover>,
    device: Mutex<Option<Box<dyn Device>>>,
    metrics: DeviceMetrics,
    registry: Registry,
}

impl Collector {
    /// Create a collector for `host` with empty instruments. The device is
    /// not contacted until the first poll.
    pub fn new(host: impl Into<String>, credentials: Credentials, client: Arc<dyn Discover>) -> Self {
        let metrics = DeviceMetrics::default();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        Self {
            host: host.into(),
            credentials,
            client,
            device: Mutex::new(None),
            metrics,
            registry,
        }
    }

    /// Address of the target device.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Credentials used for every discovery of the target.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Poll the device.
    ///
    /// Returns `Ok(None)` when discovery finds no device or the device has
    /// no energy meter: nothing to report, but not an error either.
    pub async fn get(&self) -> Result<Option<Snapshot>, DeviceError> {
        let mut device = self.device.lock().await;
        self.poll(&mut *device).await
    }

    /// Poll the device and record the result.
    ///
    /// Gauges are set, the on-time counter is incremented by the uptime of
    /// the device. Nothing is touched when [`Collector::get`] has nothing to
    /// report.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn update_metrics(&self) -> Result<(), DeviceError> {
        let mut device = self.device.lock().await;
        self.poll_and_record(&mut *device).await
    }

    /// Poll the device, record the result and render the registry.
    ///
    /// The rendered text always reflects this poll: no other poll of the
    /// target can write in between.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn scrape(&self) -> Result<String, DeviceError> {
        let mut device = self.device.lock().await;
        self.poll_and_record(&mut *device).await?;
        Ok(self.encode()?)
    }

    /// Registry holding the ten device instruments.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode the registry in the text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    async fn poll(
        &self,
        device: &mut Option<Box<dyn Device>>,
    ) -> Result<Option<Snapshot>, DeviceError> {
        *device = self
            .client
            .discover_single(&self.host, &self.credentials)
            .await?;
        let Some(device) = device.as_mut() else {
            debug!(host = %self.host, "no device found");
            return Ok(None);
        };

        device.update().await?;
        if !device.has_emeter() {
            debug!(host = %self.host, "device has no energy meter");
            return Ok(None);
        }

        Snapshot::from_device(&**device).map(Some)
    }

    async fn poll_and_record(
        &self,
        device: &mut Option<Box<dyn Device>>,
    ) -> Result<(), DeviceError> {
        if let Some(snapshot) = self.poll(device).await? {
            self.metrics.record(&snapshot);
        }
        Ok(())
    }
}

/// Seconds elapsed since `on_since`, `0.0` without a timestamp.
pub fn uptime(on_since: Option<&DateTime<FixedOffset>>) -> f64 {
    uptime_at(on_since, Utc::now())
}

/// [`uptime`] against a given `now`, evaluated in the offset of `on_since`.
///
/// A timestamp in the future counts as no uptime.
pub fn uptime_at(on_since: Option<&DateTime<FixedOffset>>, now: DateTime<Utc>) -> f64 {
    let Some(on_since) = on_since else {
        return 0.0;
    };

    let elapsed = now.with_timezone(&on_since.timezone()) - *on_since;
    let seconds = match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1e6,
        None => elapsed.num_seconds() as f64,
    };
    seconds.max(0.0)
}

fn state_number(info: &StateInformation, key: &str) -> Result<f64, DeviceError> {
    match info.get(key) {
        Some(value) if value.is_truthy() => {
            value.as_f64().ok_or_else(|| DeviceError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        _ => Ok(0.0),
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
