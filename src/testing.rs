//! In-memory fakes shared by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::aggregate::Aggregator;
use crate::config::{ProxyPoolConfig, SourceOrder, SourcesConfig};
use crate::error::{HubError, Result};
use crate::models::{ProxyRecord, SourceId};
use crate::proxy::{Clock, HttpTransport, ProxyPool, ResilientFetcher, Route};
use crate::registry::ProxyRegistry;
use crate::sources::SourceSet;

pub const DRAMABOX_BASE: &str = "http://dramabox.test/api/dramabox";
pub const NETSHORT_BASE: &str = "http://netshort.test/api/netshort";
pub const MELOLO_BASE: &str = "http://melolo.test/api/melolo";

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Record checked `offset_secs` after the test epoch
pub fn proxy_record(address: &str, alive: bool, offset_secs: i64) -> ProxyRecord {
    ProxyRecord {
        address: address.to_string(),
        alive,
        last_checked: epoch() + chrono::Duration::seconds(offset_secs),
        latency_ms: alive.then_some(100),
    }
}

/// Manually advanced clock
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::at(epoch() + chrono::Duration::hours(1))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Registry backed by a vector, counting reads
#[derive(Default)]
pub struct FakeRegistry {
    records: Mutex<Vec<ProxyRecord>>,
    upserts: Mutex<Vec<(String, ProxyRecord)>>,
    list_calls: AtomicUsize,
    list_delay: Option<Duration>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakeRegistry {
    pub fn with_records(records: Vec<ProxyRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_reads: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn rejecting_writes() -> Self {
        Self {
            fail_writes: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn set_records(&self, records: Vec<ProxyRecord>) {
        *self.records.lock() = records;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> Vec<(String, ProxyRecord)> {
        self.upserts.lock().clone()
    }
}

#[async_trait]
impl ProxyRegistry for FakeRegistry {
    async fn list(&self) -> Result<Vec<ProxyRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HubError::RegistryUnavailable("fake outage".to_string()));
        }
        Ok(self.records.lock().clone())
    }

    async fn upsert(&self, key: &str, record: &ProxyRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HubError::RegistryUnavailable("fake write outage".to_string()));
        }
        self.upserts.lock().push((key.to_string(), record.clone()));
        Ok(())
    }
}

/// Canned reply for one scripted request
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Bytes),
    Status(u16),
    Fail(String),
    Hang,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Reply::Body(Bytes::from(value.to_string()))
    }

    pub fn text(body: &str) -> Self {
        Reply::Body(Bytes::from(body.to_string()))
    }
}

/// One observed transport call
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

/// Transport answering from a script
///
/// Direct replies are keyed by URL, tunnelled replies by proxy address.
/// Anything unscripted fails.
#[derive(Default)]
pub struct ScriptedTransport {
    direct: Mutex<HashMap<String, Reply>>,
    proxied: Mutex<HashMap<String, Reply>>,
    proxy_default: Mutex<Option<Reply>>,
    calls: Mutex<Vec<Call>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on_direct(&self, url: &str, reply: Reply) -> &Self {
        self.direct.lock().insert(url.to_string(), reply);
        self
    }

    pub fn on_proxy(&self, address: &str, reply: Reply) -> &Self {
        self.proxied.lock().insert(address.to_string(), reply);
        self
    }

    pub fn on_any_proxy(&self, reply: Reply) -> &Self {
        *self.proxy_default.lock() = Some(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn proxy_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.proxy.is_some()).count()
    }

    pub fn direct_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.proxy.is_none()).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, url: &str, route: Route<'_>) -> Option<Reply> {
        match route {
            Route::Direct => self.direct.lock().get(url).cloned(),
            Route::Socks5(proxy) => self
                .proxied
                .lock()
                .get(proxy.as_str())
                .cloned()
                .or_else(|| self.proxy_default.lock().clone()),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &HeaderMap,
        route: Route<'_>,
        timeout: Duration,
    ) -> Result<Bytes> {
        self.calls.lock().push(Call {
            url: url.to_string(),
            proxy: match route {
                Route::Direct => None,
                Route::Socks5(proxy) => Some(proxy.to_string()),
            },
            timeout,
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.reply_for(url, route);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(HubError::UpstreamStatus { status }),
            Some(Reply::Fail(reason)) => Err(HubError::Upstream(reason)),
            Some(Reply::Hang) => {
                tokio::time::sleep(timeout + Duration::from_secs(60)).await;
                Err(HubError::Timeout)
            }
            None => Err(HubError::Upstream(format!("connection refused: {}", url))),
        }
    }
}

/// Source config pointing at the scripted `.test` hosts
pub fn test_sources_config(proxy_gated: Vec<SourceId>) -> SourcesConfig {
    SourcesConfig {
        dramabox_base_url: DRAMABOX_BASE.to_string(),
        netshort_base_url: NETSHORT_BASE.to_string(),
        melolo_base_url: MELOLO_BASE.to_string(),
        proxy_gated,
        order: SourceOrder::default(),
    }
}

/// Fetcher over a scripted transport and fake registry
pub fn fetcher(transport: Arc<ScriptedTransport>, registry: Arc<FakeRegistry>) -> ResilientFetcher {
    let config = ProxyPoolConfig::default();
    let pool = Arc::new(ProxyPool::new(
        registry,
        Arc::new(FakeClock::default()),
        &config,
    ));
    ResilientFetcher::new(pool, transport, &config)
}

/// Aggregator with no proxy-gated sources, served only by direct replies
pub fn direct_aggregator(transport: Arc<ScriptedTransport>) -> Aggregator {
    let sources_config = test_sources_config(Vec::new());
    let sources = SourceSet::from_config(&sources_config).unwrap();
    let fetcher = fetcher(transport, Arc::new(FakeRegistry::failing()));
    Aggregator::new(Arc::new(fetcher), sources, sources_config.order)
}
