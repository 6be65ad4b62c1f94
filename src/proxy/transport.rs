//! HTTP transport, direct or tunnelled through a SOCKS5 proxy
//!
//! Every tunnelled attempt gets its own client so no connection is reused
//! across proxies.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, instrument};

use crate::error::{HubError, Result};
use crate::models::ProxyAddress;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Network path for a single attempt
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Direct,
    Socks5(&'a ProxyAddress),
}

/// Performs a single GET and returns the raw body of a 2xx response
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        route: Route<'_>,
        timeout: Duration,
    ) -> Result<Bytes>;
}

/// Headers a desktop browser would send
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    direct: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        // Ignore HTTP(S)_PROXY from the environment for the direct path.
        let direct = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| HubError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { direct })
    }

    fn tunnel_client(proxy: &ProxyAddress) -> Result<reqwest::Client> {
        let proxy_cfg = reqwest::Proxy::all(proxy.socks5_url())
            .map_err(|e| HubError::InvalidProxyAddress(format!("{}: {}", proxy, e)))?;

        reqwest::Client::builder()
            .proxy(proxy_cfg)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| HubError::Internal(format!("failed to build tunnel client: {}", e)))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, headers), fields(via = ?route))]
    async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        route: Route<'_>,
        timeout: Duration,
    ) -> Result<Bytes> {
        let client = match route {
            Route::Direct => self.direct.clone(),
            Route::Socks5(proxy) => Self::tunnel_client(proxy)?,
        };

        let response = client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Upstream rejected request");
            return Err(HubError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}
