//! Resilient fetch: one proxy attempt, then one direct attempt
//!
//! ```text
//! Unresolved ──candidate──► proxy attempt ──ok──► Proxy
//!     │                          │
//!     │ no candidate             │ error / timeout / bad JSON
//!     ▼                          ▼
//!  direct attempt ◄──────────────┘ ──► Direct (payload or error)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::pool::ProxyPool;
use super::transport::{HttpTransport, Route};
use crate::config::ProxyPoolConfig;
use crate::error::{HubError, Result};
use crate::models::FetchOutcome;

pub struct ResilientFetcher {
    pool: Arc<ProxyPool>,
    transport: Arc<dyn HttpTransport>,
    proxy_timeout: Duration,
    direct_timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(
        pool: Arc<ProxyPool>,
        transport: Arc<dyn HttpTransport>,
        config: &ProxyPoolConfig,
    ) -> Self {
        Self {
            pool,
            transport,
            proxy_timeout: config.proxy_timeout,
            direct_timeout: config.direct_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Fetch JSON through a pooled proxy, falling back to a direct request
    ///
    /// Never fails: the outcome records which path served the request and
    /// any errors along the way.
    #[instrument(skip(self, headers))]
    pub async fn fetch(&self, url: &str, headers: &HeaderMap) -> FetchOutcome {
        let outcome = FetchOutcome::start(url);

        let outcome = match self.pool.candidate().await {
            Ok(proxy) => {
                let started = Instant::now();
                match self
                    .attempt(url, headers, Route::Socks5(&proxy), self.proxy_timeout)
                    .await
                {
                    Ok(payload) => {
                        debug!(proxy = %proxy, elapsed = ?started.elapsed(), "Served via proxy");
                        return outcome.done_via_proxy(proxy, payload);
                    }
                    Err(e) => {
                        let failure = HubError::ProxyAttemptFailed {
                            proxy: proxy.to_string(),
                            reason: e.to_string(),
                        };
                        warn!(error = %failure, "Falling back to direct fetch");
                        outcome.proxy_failed(proxy, failure.to_string())
                    }
                }
            }
            Err(e) => {
                debug!(reason = %e, "No proxy candidate, fetching directly");
                outcome
            }
        };

        let result = self
            .attempt(url, headers, Route::Direct, self.direct_timeout)
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "Direct fetch failed");
        }
        outcome.done_direct(result)
    }

    /// Fetch JSON directly, never touching the pool
    #[instrument(skip(self, headers))]
    pub async fn fetch_direct(&self, url: &str, headers: &HeaderMap) -> FetchOutcome {
        let result = self
            .attempt(url, headers, Route::Direct, self.direct_timeout)
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "Direct fetch failed");
        }
        FetchOutcome::start(url).done_direct(result)
    }

    async fn attempt(
        &self,
        url: &str,
        headers: &HeaderMap,
        route: Route<'_>,
        timeout: Duration,
    ) -> Result<Value> {
        let body = tokio::time::timeout(timeout, self.transport.get(url, headers, route, timeout))
            .await
            .map_err(|_| HubError::Timeout)??;

        Ok(serde_json::from_slice(&body)?)
    }
}
