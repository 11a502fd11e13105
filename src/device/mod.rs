//! Device client interface consumed by the [`Collector`](crate::collector::Collector).
//!
//! A [`Discover`] implementation turns a network address and [`Credentials`]
//! into a [`Device`] handle. The handle fetches live state on
//! [`Device::update`] and exposes it through read-only accessors, most
//! notably the free-form [`StateInformation`] mapping.
//!
//! [`KasaClient`] implements the interface for the legacy Kasa local
//! protocol.

use std::collections::HashMap;
use std::fmt::{self, Debug};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use crate::error::DeviceError;

mod iot;
mod protocol;

pub use iot::{IotPlug, KasaClient};

/// Credentials handed to the device client on discovery.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password, never logged.
    pub password: String,
}

impl Credentials {
    /// Credentials for `username`.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Free-form device state keyed by human readable names such as
/// `"Current consumption"` or `"On since"`.
pub type StateInformation = HashMap<String, StateValue>;

/// A single [`StateInformation`] entry.
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    /// A flag such as `"State"`.
    Bool(bool),
    /// A reading such as `"Voltage"`.
    Number(f64),
    /// A reading the device delivered as text.
    Text(String),
    /// A point in time such as `"On since"`.
    Timestamp(DateTime<FixedOffset>),
}

impl StateValue {
    /// `false`, zero and the empty string are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            StateValue::Bool(b) => *b,
            StateValue::Number(n) => *n != 0.0,
            StateValue::Text(s) => !s.is_empty(),
            StateValue::Timestamp(_) => true,
        }
    }

    /// Numeric reading of the value, `None` if it has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            StateValue::Number(n) => Some(*n),
            StateValue::Text(s) => s.trim().parse().ok(),
            StateValue::Timestamp(_) => None,
        }
    }

    /// The timestamp, if the value is one.
    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            StateValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{b}"),
            StateValue::Number(n) => write!(f, "{n}"),
            StateValue::Text(s) => f.write_str(s),
            StateValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<f64> for StateValue {
    fn from(n: f64) -> Self {
        StateValue::Number(n)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Text(s.to_string())
    }
}

impl From<DateTime<FixedOffset>> for StateValue {
    fn from(t: DateTime<FixedOffset>) -> Self {
        StateValue::Timestamp(t)
    }
}

/// Handle to a discovered device.
#[async_trait]
pub trait Device: Debug + Send + Sync {
    /// Fetch the live state of the device.
    async fn update(&mut self) -> Result<(), DeviceError>;

    /// User-assigned name, `None` if the device has none.
    fn alias(&self) -> Option<&str>;

    /// Model name, e.g. `HS110(EU)`.
    fn model(&self) -> &str;

    /// Whether the device can report power, voltage and current.
    fn has_emeter(&self) -> bool;

    /// Raw system information as reported by the device.
    fn sys_info(&self) -> &Map<String, Value>;

    /// Hardware and firmware identification, a subset of [`Device::sys_info`].
    fn hw_info(&self) -> Map<String, Value>;

    /// Human readable state as of the last [`Device::update`].
    fn state_information(&self) -> StateInformation;
}

/// Finds the device behind a network address.
#[async_trait]
pub trait Discover: Debug + Send + Sync {
    /// `Ok(None)` when something answered at `host` but is not a supported
    /// device.
    async fn discover_single(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Option<Box<dyn Device>>, DeviceError>;
}
