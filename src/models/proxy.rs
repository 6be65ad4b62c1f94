use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Characters a registry path segment must not contain
const UNSAFE_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// A validated `host:port` proxy address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProxyAddress(String);

impl ProxyAddress {
    /// Parse a `host:port` string with exactly one separator
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        let (host, port) = match raw.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, port),
            _ => {
                return Err(HubError::InvalidProxyAddress(format!(
                    "'{}' must be host:port",
                    raw
                )))
            }
        };

        if host.is_empty()
            || host
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '@' | '?' | '#'))
        {
            return Err(HubError::InvalidProxyAddress(format!(
                "'{}' has an invalid host",
                raw
            )));
        }

        match port.parse::<u16>() {
            Ok(p) if p > 0 => Ok(Self(raw.to_string())),
            _ => Err(HubError::InvalidProxyAddress(format!(
                "'{}' has an invalid port",
                raw
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.split_once(':').map(|(h, _)| h).unwrap_or(&self.0)
    }

    pub fn port(&self) -> u16 {
        self.0
            .split_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or_default()
    }

    /// Key used for this address in the proxy registry
    pub fn registry_key(&self) -> String {
        self.0.replace(UNSAFE_KEY_CHARS, "_")
    }

    /// Proxy URL for a SOCKS5 tunnel with remote DNS resolution
    pub fn socks5_url(&self) -> String {
        format!("socks5h://{}", self.0)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proxy health record as stored in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    #[serde(rename = "proxy")]
    pub address: String,
    pub alive: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_checked: DateTime<Utc>,
    /// Canary round-trip in milliseconds, `null` for dead proxies
    #[serde(rename = "latency", default)]
    pub latency_ms: Option<u64>,
}

impl ProxyRecord {
    pub fn latency(&self) -> Option<Duration> {
        self.latency_ms.map(Duration::from_millis)
    }

    /// Address of this record if it may be handed out by the pool
    pub fn selectable_address(&self) -> Option<ProxyAddress> {
        if !self.alive {
            return None;
        }
        ProxyAddress::parse(&self.address).ok()
    }
}
