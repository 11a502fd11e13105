//! Errors surfaced while talking to a device.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure to poll a device.
///
/// A device that cannot be found or has no energy meter is not an error, see
/// [`Collector::get`](crate::collector::Collector::get).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No answer from the device within the client timeout.
    #[error("timed out talking to {host}")]
    Timeout {
        /// Device address.
        host: String,
    },

    /// The TCP connection could not be established.
    #[error("failed to connect to {host}: {source}")]
    Connect {
        /// Device address.
        host: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing an established connection failed.
    #[error("i/o error talking to {host}: {source}")]
    Io {
        /// Device address.
        host: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The device answered with something other than the expected JSON.
    #[error("malformed response from {host}: {source}")]
    Decode {
        /// Device address.
        host: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The device answered with a non-zero `err_code`.
    #[error("{module}.{method} failed with code {code}: {message}")]
    Device {
        /// Module of the failed request, e.g. `emeter`.
        module: String,
        /// Method of the failed request, e.g. `get_realtime`.
        method: String,
        /// `err_code` of the answer.
        code: i64,
        /// `err_msg` of the answer, empty if absent.
        message: String,
    },

    /// A truthy state entry that does not read as a number.
    #[error("state entry {key:?} is not numeric: {value}")]
    InvalidValue {
        /// Name of the state entry.
        key: String,
        /// The offending value.
        value: String,
    },

    /// Rendering the metrics of a poll failed.
    #[error("failed to encode metrics")]
    Encode(#[from] std::fmt::Error),
}

impl IntoResponse for DeviceError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "device poll failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
