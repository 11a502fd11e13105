//! Smart plugs speaking the legacy Kasa local protocol.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Local, TimeDelta};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::protocol::{query, Endpoint};
use super::{Credentials, Device, Discover, StateInformation, StateValue};
use crate::config::DeviceConfig;
use crate::error::DeviceError;

const HW_INFO_KEYS: [&str; 10] = [
    "sw_ver", "hw_ver", "mac", "mic_mac", "type", "mic_type", "hwId", "fwId", "oemId", "dev_name",
];

/// [`Discover`] implementation for the legacy Kasa protocol.
///
/// The protocol is unauthenticated, the credentials are only logged.
#[derive(Clone, Debug, Default)]
pub struct KasaClient {
    config: DeviceConfig,
}

impl KasaClient {
    /// Client connecting with the port and timeout of `config`.
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Discover for KasaClient {
    async fn discover_single(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Option<Box<dyn Device>>, DeviceError> {
        let endpoint = Endpoint::parse(host, self.config.port);
        debug!(
            host = %endpoint.host,
            port = endpoint.port,
            username = %credentials.username,
            "discovering device"
        );

        let request = json!({ "system": { "get_sysinfo": {} } });
        let response = query(&endpoint, &request, self.config.timeout).await?;
        let sys_info = extract(&response, "system", "get_sysinfo")?;

        if !is_plug(&sys_info) {
            debug!(host = %endpoint.host, "not a smart plug");
            return Ok(None);
        }

        let plug: Box<dyn Device> = Box::new(IotPlug::new(endpoint, self.config.timeout, sys_info));
        Ok(Some(plug))
    }
}

/// A smart plug, optionally with an energy meter (HS110, KP115, ...).
#[derive(Debug)]
pub struct IotPlug {
    endpoint: Endpoint,
    timeout: Duration,
    sys_info: Map<String, Value>,
    emeter: Option<EnergyReading>,
    updated_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct EnergyReading {
    power: f64,
    voltage: f64,
    current: f64,
    today: f64,
    month: f64,
}

impl IotPlug {
    pub(crate) fn new(endpoint: Endpoint, timeout: Duration, sys_info: Map<String, Value>) -> Self {
        Self {
            endpoint,
            timeout,
            sys_info,
            emeter: None,
            updated_at: Local::now().fixed_offset(),
        }
    }

    fn request(has_emeter: bool, now: &DateTime<FixedOffset>) -> Value {
        let mut request = json!({ "system": { "get_sysinfo": {} } });
        if has_emeter {
            request["emeter"] = json!({
                "get_realtime": {},
                "get_daystat": { "year": now.year(), "month": now.month() },
                "get_monthstat": { "year": now.year() },
            });
        }
        request
    }

    fn read_emeter(
        &self,
        response: &Value,
        now: &DateTime<FixedOffset>,
    ) -> Result<EnergyReading, DeviceError> {
        let realtime: Realtime = self.decode(extract(response, "emeter", "get_realtime")?)?;
        let daystat: DayStat = self.decode(extract(response, "emeter", "get_daystat")?)?;
        let monthstat: MonthStat = self.decode(extract(response, "emeter", "get_monthstat")?)?;

        Ok(EnergyReading {
            power: realtime.power(),
            voltage: realtime.voltage(),
            current: realtime.current(),
            today: daystat.energy(now.year(), now.month(), now.day()),
            month: monthstat.energy(now.year(), now.month()),
        })
    }

    fn decode<T: DeserializeOwned>(&self, map: Map<String, Value>) -> Result<T, DeviceError> {
        serde_json::from_value(Value::Object(map)).map_err(|source| DeviceError::Decode {
            host: self.endpoint.host.clone(),
            source,
        })
    }

    fn is_on(&self) -> bool {
        self.sys_info
            .get("relay_state")
            .and_then(Value::as_i64)
            .map(|state| state == 1)
            .unwrap_or(false)
    }

    fn on_since(&self) -> Option<DateTime<FixedOffset>> {
        if !self.is_on() {
            return None;
        }
        let on_time = self.sys_info.get("on_time").and_then(Value::as_i64)?;
        self.updated_at
            .checked_sub_signed(TimeDelta::try_seconds(on_time)?)
    }
}

#[async_trait]
impl Device for IotPlug {
    async fn update(&mut self) -> Result<(), DeviceError> {
        let now = Local::now().fixed_offset();
        let has_emeter = self.has_emeter();

        let response = query(&self.endpoint, &Self::request(has_emeter, &now), self.timeout).await?;
        self.sys_info = extract(&response, "system", "get_sysinfo")?;
        self.emeter = if has_emeter && self.has_emeter() {
            Some(self.read_emeter(&response, &now)?)
        } else {
            None
        };
        self.updated_at = now;

        Ok(())
    }

    fn alias(&self) -> Option<&str> {
        self.sys_info.get("alias").and_then(Value::as_str)
    }

    fn model(&self) -> &str {
        self.sys_info
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn has_emeter(&self) -> bool {
        self.sys_info
            .get("feature")
            .and_then(Value::as_str)
            .map(|feature| feature.split(':').any(|f| f == "ENE"))
            .unwrap_or(false)
    }

    fn sys_info(&self) -> &Map<String, Value> {
        &self.sys_info
    }

    fn hw_info(&self) -> Map<String, Value> {
        let mut info: Map<String, Value> = HW_INFO_KEYS
            .iter()
            .filter_map(|key| {
                self.sys_info
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();
        if !info.contains_key("mac") {
            if let Some(mac) = info.get("mic_mac").cloned() {
                info.insert("mac".to_string(), mac);
            }
        }
        info
    }

    fn state_information(&self) -> StateInformation {
        let mut state = StateInformation::new();
        state.insert("State".to_string(), self.is_on().into());
        if let Some(on_since) = self.on_since() {
            state.insert("On since".to_string(), on_since.into());
        }
        if let Some(rssi) = self.sys_info.get("rssi").and_then(Value::as_f64) {
            state.insert("RSSI".to_string(), rssi.into());
        }
        if let Some(emeter) = &self.emeter {
            let entries = [
                ("Current consumption", emeter.power),
                ("Voltage", emeter.voltage),
                ("Current", emeter.current),
                ("Today's consumption", emeter.today),
                ("This month's consumption", emeter.month),
            ];
            for (name, value) in entries {
                state.insert(name.to_string(), StateValue::Number(value));
            }
        }
        state
    }
}

fn is_plug(sys_info: &Map<String, Value>) -> bool {
    ["type", "mic_type"]
        .iter()
        .filter_map(|key| sys_info.get(*key).and_then(Value::as_str))
        .any(|kind| kind.to_ascii_uppercase().contains("SMARTPLUGSWITCH"))
}

/// The `module.method` object of a response, checked for a non-zero
/// `err_code`.
fn extract(response: &Value, module: &str, method: &str) -> Result<Map<String, Value>, DeviceError> {
    let device_error = |code, message: &str| DeviceError::Device {
        module: module.to_string(),
        method: method.to_string(),
        code,
        message: message.to_string(),
    };

    let result = match response.get(module).and_then(|m| m.get(method)) {
        Some(Value::Object(result)) => result,
        _ => return Err(device_error(-1, "missing from response")),
    };

    match result.get("err_code").and_then(Value::as_i64) {
        None | Some(0) => Ok(result.clone()),
        Some(code) => {
            let message = result
                .get("err_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(device_error(code, message))
        }
    }
}

/// `emeter.get_realtime`. Older hardware reports in base units, newer in
/// milli units.
#[derive(Debug, Default, Deserialize)]
struct Realtime {
    power: Option<f64>,
    power_mw: Option<f64>,
    voltage: Option<f64>,
    voltage_mv: Option<f64>,
    current: Option<f64>,
    current_ma: Option<f64>,
}

fn milli(base: Option<f64>, milli: Option<f64>) -> f64 {
    base.or(milli.map(|v| v / 1000.0)).unwrap_or_default()
}

impl Realtime {
    fn power(&self) -> f64 {
        milli(self.power, self.power_mw)
    }

    fn voltage(&self) -> f64 {
        milli(self.voltage, self.voltage_mv)
    }

    fn current(&self) -> f64 {
        milli(self.current, self.current_ma)
    }
}

#[derive(Debug, Default, Deserialize)]
struct DayStat {
    #[serde(default)]
    day_list: Vec<StatEntry>,
}

impl DayStat {
    fn energy(&self, year: i32, month: u32, day: u32) -> f64 {
        self.day_list
            .iter()
            .find(|e| e.year == year && e.month == month && e.day == Some(day))
            .map(StatEntry::kwh)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct MonthStat {
    #[serde(default)]
    month_list: Vec<StatEntry>,
}

impl MonthStat {
    fn energy(&self, year: i32, month: u32) -> f64 {
        self.month_list
            .iter()
            .find(|e| e.year == year && e.month == month)
            .map(StatEntry::kwh)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    year: i32,
    month: u32,
    day: Option<u32>,
    energy: Option<f64>,
    energy_wh: Option<f64>,
}

impl StatEntry {
    fn kwh(&self) -> f64 {
        milli(self.energy, self.energy_wh)
    }
}
