//! Legacy Kasa transport: JSON obfuscated with an XOR autokey cipher, framed
//! by a 4-byte big-endian length, over TCP.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::DeviceError;

const INITIAL_KEY: u8 = 171;

/// Responses larger than this are treated as corrupt.
const MAX_RESPONSE_LEN: usize = 1 << 20;

pub(crate) fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plaintext
        .iter()
        .map(|b| {
            key ^= b;
            key
        })
        .collect()
}

pub(crate) fn decrypt(ciphertext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    ciphertext
        .iter()
        .map(|&b| {
            let plain = key ^ b;
            key = b;
            plain
        })
        .collect()
}

/// A connection target, `host` or `host:port`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(target: &str, default_port: u16) -> Self {
        if let Ok(addr) = target.parse::<std::net::SocketAddr>() {
            return Self {
                host: addr.ip().to_string(),
                port: addr.port(),
            };
        }
        match target.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => Self {
                    host: host.to_string(),
                    port,
                },
                Err(_) => Self {
                    host: target.to_string(),
                    port: default_port,
                },
            },
            _ => Self {
                host: target.to_string(),
                port: default_port,
            },
        }
    }
}

/// Send one request and read one response, the whole exchange bounded by
/// `timeout`.
pub(crate) async fn query(
    endpoint: &Endpoint,
    request: &Value,
    timeout: Duration,
) -> Result<Value, DeviceError> {
    tokio::time::timeout(timeout, exchange(endpoint, request))
        .await
        .map_err(|_| DeviceError::Timeout {
            host: endpoint.host.clone(),
        })?
}

async fn exchange(endpoint: &Endpoint, request: &Value) -> Result<Value, DeviceError> {
    let host = &endpoint.host;
    let io_err = |source: std::io::Error| DeviceError::Io {
        host: host.clone(),
        source,
    };

    let mut stream = TcpStream::connect((host.as_str(), endpoint.port))
        .await
        .map_err(|source| DeviceError::Connect {
            host: host.clone(),
            source,
        })?;

    let payload = encrypt(request.to_string().as_bytes());
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    stream.write_all(&frame).await.map_err(io_err)?;

    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.map_err(io_err)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_RESPONSE_LEN {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("response of {len} bytes exceeds limit"),
        )));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.map_err(io_err)?;

    serde_json::from_slice(&decrypt(&body)).map_err(|source| DeviceError::Decode {
        host: host.clone(),
        source,
    })
}
