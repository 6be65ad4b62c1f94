//! Proxy prober
//!
//! Pulls a public candidate list, checks every candidate against a canary
//! URL through a SOCKS5 tunnel and writes the verdicts to the registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::transport::{browser_headers, HttpTransport, Route};
use crate::config::ProberConfig;
use crate::error::{HubError, Result};
use crate::models::{ProxyAddress, ProxyRecord};
use crate::registry::ProxyRegistry;

/// Summary of one probe run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub run_id: Uuid,
    pub total_tested: usize,
    pub alive: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct ProxyProber {
    transport: Arc<dyn HttpTransport>,
    registry: Arc<dyn ProxyRegistry>,
    clock: Arc<dyn Clock>,
    config: ProberConfig,
}

impl ProxyProber {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        registry: Arc<dyn ProxyRegistry>,
        clock: Arc<dyn Clock>,
        config: ProberConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            clock,
            config,
        }
    }

    /// Probe every candidate once and record the results
    ///
    /// Fails only when the candidate list itself cannot be fetched; registry
    /// write failures are logged per record.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ProbeReport> {
        let run_id = Uuid::new_v4();
        let started_at = self.clock.now();

        let candidates = self.fetch_candidates().await?;
        info!(%run_id, candidates = candidates.len(), "Starting proxy probe run");

        let canary_headers = browser_headers();
        let results = futures::stream::iter(candidates)
            .map(|address| {
                let headers = &canary_headers;
                async move {
                    let latency_ms = self.probe(&address, headers).await;
                    let record = ProxyRecord {
                        address: address.to_string(),
                        alive: latency_ms.is_some(),
                        last_checked: self.clock.now(),
                        latency_ms,
                    };

                    if let Err(e) = self.registry.upsert(&address.registry_key(), &record).await {
                        warn!("Failed to record probe result for {}: {}", address, e);
                    }

                    record.alive
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<bool>>()
            .await;

        let alive = results.iter().filter(|&&v| v).count();
        let report = ProbeReport {
            run_id,
            total_tested: results.len(),
            alive,
            started_at,
            finished_at: self.clock.now(),
        };

        info!(
            %run_id,
            "Probe run complete: {} alive, {} dead",
            report.alive,
            report.total_tested - report.alive
        );

        Ok(report)
    }

    /// Download and parse the candidate list, one `host:port` per line
    async fn fetch_candidates(&self) -> Result<Vec<ProxyAddress>> {
        let body = timeout(
            self.config.timeout,
            self.transport.get(
                &self.config.candidates_url,
                &HeaderMap::new(),
                Route::Direct,
                self.config.timeout,
            ),
        )
        .await
        .map_err(|_| HubError::Timeout)??;

        Ok(parse_candidates(&String::from_utf8_lossy(&body)))
    }

    /// Latency in milliseconds if the canary answered through the proxy
    #[instrument(skip(self, headers), fields(proxy = %address))]
    async fn probe(&self, address: &ProxyAddress, headers: &HeaderMap) -> Option<u64> {
        let started = Instant::now();
        let result = timeout(
            self.config.timeout,
            self.transport.get(
                &self.config.canary_url,
                headers,
                Route::Socks5(address),
                self.config.timeout,
            ),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let latency = started.elapsed().as_millis() as u64;
                debug!(latency_ms = latency, "Proxy answered canary");
                Some(latency)
            }
            Ok(Err(e)) => {
                debug!("Proxy is dead: {}", e);
                None
            }
            Err(_) => {
                debug!("Proxy is dead: canary timed out");
                None
            }
        }
    }
}

/// Unique, well-formed addresses in first-seen order
fn parse_candidates(body: &str) -> Vec<ProxyAddress> {
    let mut seen = HashSet::new();
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match ProxyAddress::parse(line) {
            Ok(address) => Some(address),
            Err(e) => {
                debug!("Skipping candidate: {}", e);
                None
            }
        })
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, FakeRegistry, Reply, ScriptedTransport};
    use std::time::Duration;

    const CANDIDATES: &str = "http://lists.test/socks5.txt";

    fn prober(
        transport: Arc<ScriptedTransport>,
        registry: Arc<FakeRegistry>,
        concurrency: usize,
    ) -> ProxyProber {
        let config = ProberConfig {
            candidates_url: CANDIDATES.to_string(),
            canary_url: "http://canary.test/latest".to_string(),
            timeout: Duration::from_secs(15),
            concurrency,
            interval: None,
        };
        ProxyProber::new(transport, registry, Arc::new(FakeClock::default()), config)
    }

    #[test]
    fn candidate_list_is_deduplicated_and_validated() {
        let parsed = parse_candidates("1.1.1.1:1080\n\n  2.2.2.2:4145 \r\nnot a proxy\n1.1.1.1:1080\n3.3.3.3:0\n");
        let addresses: Vec<&str> = parsed.iter().map(|a| a.as_str()).collect();
        assert_eq!(addresses, vec!["1.1.1.1:1080", "2.2.2.2:4145"]);
    }

    #[tokio::test]
    async fn records_alive_and_dead_proxies() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(CANDIDATES, Reply::text("1.1.1.1:1080\n2.2.2.2:1080\n3.3.3.3:1080\n"));
        transport.on_proxy("1.1.1.1:1080", Reply::json(serde_json::json!([])));
        transport.on_proxy("3.3.3.3:1080", Reply::Status(407));

        let registry = Arc::new(FakeRegistry::default());
        let report = prober(transport, registry.clone(), 30).run().await.unwrap();

        assert_eq!(report.total_tested, 3);
        assert_eq!(report.alive, 1);
        assert!(report.finished_at >= report.started_at);

        let mut upserts = registry.upserts();
        upserts.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(upserts.len(), 3);

        let (key, alive) = &upserts[0];
        assert_eq!(key, "1_1_1_1:1080");
        assert!(alive.alive);
        assert!(alive.latency_ms.is_some());

        let (key, dead) = &upserts[1];
        assert_eq!(key, "2_2_2_2:1080");
        assert!(!dead.alive);
        assert_eq!(dead.latency_ms, None);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(20)));
        let list: String = (1..=12).map(|i| format!("10.0.0.{}:1080\n", i)).collect();
        transport.on_direct(CANDIDATES, Reply::text(&list));
        transport.on_any_proxy(Reply::json(serde_json::json!({})));

        let report = prober(transport.clone(), Arc::new(FakeRegistry::default()), 3)
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_tested, 12);
        assert_eq!(report.alive, 12);
        assert!(transport.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn registry_write_failures_do_not_abort_the_run() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(CANDIDATES, Reply::text("1.1.1.1:1080\n2.2.2.2:1080\n"));
        transport.on_any_proxy(Reply::json(serde_json::json!({})));

        let report = prober(transport, Arc::new(FakeRegistry::rejecting_writes()), 30)
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_tested, 2);
        assert_eq!(report.alive, 2);
    }

    #[tokio::test]
    async fn unreachable_candidate_list_fails_the_run() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(CANDIDATES, Reply::Status(404));

        let result = prober(transport.clone(), Arc::new(FakeRegistry::default()), 30)
            .run()
            .await;

        assert!(matches!(result, Err(HubError::UpstreamStatus { status: 404 })));
        assert_eq!(transport.proxy_calls(), 0);
    }
}
