use serde::Serialize;
use serde_json::Value;

use super::ProxyAddress;
use crate::error::{HubError, Result};

/// How a fetch was finally served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMode {
    Unresolved,
    Proxy,
    Direct,
}

/// Structured result of one resilient fetch
///
/// A returned outcome always carries a terminal mode (`Proxy` or `Direct`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub url: String,
    pub mode: FetchMode,
    pub proxy_address: Option<ProxyAddress>,
    /// Why the proxy attempt failed, if one was made and failed
    pub proxy_error: Option<String>,
    pub payload: Option<Value>,
    pub error: Option<String>,
    /// The terminal attempt ran out of time
    #[serde(skip)]
    pub timed_out: bool,
}

impl FetchOutcome {
    pub(crate) fn start(url: &str) -> Self {
        Self {
            url: url.to_string(),
            mode: FetchMode::Unresolved,
            proxy_address: None,
            proxy_error: None,
            payload: None,
            error: None,
            timed_out: false,
        }
    }

    pub(crate) fn proxy_failed(mut self, proxy: ProxyAddress, reason: String) -> Self {
        self.proxy_address = Some(proxy);
        self.proxy_error = Some(reason);
        self
    }

    pub(crate) fn done_via_proxy(mut self, proxy: ProxyAddress, payload: Value) -> Self {
        self.mode = FetchMode::Proxy;
        self.proxy_address = Some(proxy);
        self.payload = Some(payload);
        self
    }

    pub(crate) fn done_direct(mut self, result: Result<Value>) -> Self {
        self.mode = FetchMode::Direct;
        match result {
            Ok(payload) => self.payload = Some(payload),
            Err(e) => {
                self.timed_out = matches!(e, HubError::Timeout);
                self.error = Some(e.to_string());
            }
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.payload.is_some()
    }

    /// Payload of a successful fetch, or the terminal direct failure
    pub fn into_payload(self) -> Result<Value> {
        match self.payload {
            Some(payload) => Ok(payload),
            None if self.timed_out => Err(HubError::Timeout),
            None => Err(HubError::DirectAttemptFailed(
                self.error
                    .unwrap_or_else(|| format!("no payload from {}", self.url)),
            )),
        }
    }
}
