//! Cached pool of alive proxies
//!
//! Holds a TTL-bounded snapshot of the registry and hands out a random proxy
//! among the most recently validated ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use crate::config::ProxyPoolConfig;
use crate::error::{HubError, Result};
use crate::models::{ProxyAddress, ProxyRecord};
use crate::registry::ProxyRegistry;

/// One selectable proxy
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub address: ProxyAddress,
    pub last_checked: DateTime<Utc>,
    pub latency: Option<Duration>,
}

/// Alive, well-formed proxies ordered freshest first
#[derive(Debug, Clone, Default)]
pub struct ProxyPoolSnapshot {
    entries: Vec<PoolEntry>,
}

impl ProxyPoolSnapshot {
    pub fn from_records(records: Vec<ProxyRecord>) -> Self {
        let mut entries: Vec<PoolEntry> = records
            .into_iter()
            .filter_map(|record| {
                let address = record.selectable_address()?;
                Some(PoolEntry {
                    address,
                    last_checked: record.last_checked,
                    latency: record.latency(),
                })
            })
            .collect();

        entries.sort_by(|a, b| b.last_checked.cmp(&a.last_checked));
        Self { entries }
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniform pick among the `top_n` freshest entries
    pub fn pick(&self, top_n: usize) -> Option<&ProxyAddress> {
        let freshest = &self.entries[..top_n.min(self.entries.len())];
        freshest
            .choose(&mut rand::thread_rng())
            .map(|entry| &entry.address)
    }
}

/// Snapshot plus the moment it was taken; replaced wholesale
#[derive(Debug)]
pub struct CacheState {
    pub snapshot: ProxyPoolSnapshot,
    pub captured_at: DateTime<Utc>,
}

/// Pool summary for health reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub cached: usize,
    pub captured_at: Option<DateTime<Utc>>,
    pub fresh: bool,
}

/// Process-wide proxy pool cache
pub struct ProxyPool {
    registry: Arc<dyn ProxyRegistry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    top_n: usize,
    state: ArcSwapOption<CacheState>,
    refresh_lock: Mutex<()>,
    /// Completed registry reads, successful or not
    refreshes: AtomicU64,
    /// Why the latest registry read failed, cleared on success
    last_failure: ArcSwapOption<String>,
}

impl ProxyPool {
    pub fn new(
        registry: Arc<dyn ProxyRegistry>,
        clock: Arc<dyn Clock>,
        config: &ProxyPoolConfig,
    ) -> Self {
        Self {
            registry,
            clock,
            ttl: config.cache_ttl,
            top_n: config.top_n.max(1),
            state: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
            last_failure: ArcSwapOption::empty(),
        }
    }

    /// Pick a proxy, refreshing from the registry when the cache is stale
    ///
    /// Fails with `RegistryUnavailable` or `ProxyUnavailable`; callers treat
    /// both as "no proxy".
    #[instrument(skip(self))]
    pub async fn candidate(&self) -> Result<ProxyAddress> {
        if let Some(address) = self.pick_cached() {
            return Ok(address);
        }

        // Single-flight: one registry read at a time. Callers that queued
        // behind a read take its outcome, failure included.
        let seen = self.refreshes.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;
        if self.refreshes.load(Ordering::Acquire) != seen {
            return self.latest_outcome();
        }
        if let Some(address) = self.pick_cached() {
            return Ok(address);
        }

        let refreshed = self.refresh().await;
        self.refreshes.fetch_add(1, Ordering::AcqRel);
        refreshed?
            .snapshot
            .pick(self.top_n)
            .cloned()
            .ok_or(HubError::ProxyUnavailable)
    }

    /// Current cache summary
    pub fn status(&self) -> PoolStatus {
        match self.state.load_full() {
            Some(state) => PoolStatus {
                cached: state.snapshot.len(),
                captured_at: Some(state.captured_at),
                fresh: self.is_fresh(&state),
            },
            None => PoolStatus {
                cached: 0,
                captured_at: None,
                fresh: false,
            },
        }
    }

    fn pick_cached(&self) -> Option<ProxyAddress> {
        let state = self.state.load_full()?;
        if !self.is_fresh(&state) {
            return None;
        }
        state.snapshot.pick(self.top_n).cloned()
    }

    fn latest_outcome(&self) -> Result<ProxyAddress> {
        if let Some(reason) = self.last_failure.load_full() {
            return Err(HubError::RegistryUnavailable(reason.to_string()));
        }
        self.state
            .load_full()
            .and_then(|state| state.snapshot.pick(self.top_n).cloned())
            .ok_or(HubError::ProxyUnavailable)
    }

    fn is_fresh(&self, state: &CacheState) -> bool {
        if state.snapshot.is_empty() {
            return false;
        }
        // A negative age (clock moved backwards) counts as stale.
        (self.clock.now() - state.captured_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }

    async fn refresh(&self) -> Result<Arc<CacheState>> {
        let records = match self.registry.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Proxy registry refresh failed");
                self.last_failure.store(Some(Arc::new(e.to_string())));
                return Err(e);
            }
        };
        self.last_failure.store(None);

        let total = records.len();
        let state = Arc::new(CacheState {
            snapshot: ProxyPoolSnapshot::from_records(records),
            captured_at: self.clock.now(),
        });
        self.state.store(Some(state.clone()));

        if state.snapshot.is_empty() {
            debug!(total, "Proxy registry has no eligible proxies");
        } else {
            info!(
                eligible = state.snapshot.len(),
                total, "Refreshed proxy pool snapshot"
            );
        }

        Ok(state)
    }
}
