//! Background proxy probe service
//!
//! Runs the prober on demand (HTTP trigger) and optionally on an interval.
//! At most one run is executing and at most one more is queued.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{error, info, instrument};

use crate::error::{HubError, Result};
use crate::proxy::{ProbeReport, ProxyProber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Latest known state of the probe service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatus {
    pub state: ProbeState,
    pub runs: u64,
    pub last_report: Option<ProbeReport>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProbeStatus {
    fn default() -> Self {
        Self {
            state: ProbeState::Idle,
            runs: 0,
            last_report: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Result of asking for a probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Queued,
    AlreadyQueued,
}

/// Probe service; consumed by `run`
pub struct ProbeRunner {
    prober: ProxyProber,
    interval: Option<Duration>,
    trigger_rx: mpsc::Receiver<()>,
    status_tx: watch::Sender<ProbeStatus>,
}

impl ProbeRunner {
    pub fn new(prober: ProxyProber, interval: Option<Duration>) -> (Self, ProbeRunnerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(ProbeStatus::default());

        let runner = Self {
            prober,
            interval,
            trigger_rx,
            status_tx,
        };
        let handle = ProbeRunnerHandle {
            trigger_tx,
            status_rx,
        };
        (runner, handle)
    }

    /// Run the service (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            prober,
            interval: period,
            mut trigger_rx,
            status_tx,
        } = self;

        match period {
            Some(p) => info!("Starting proxy probe service ({}s interval)", p.as_secs()),
            None => info!("Starting proxy probe service (on demand only)"),
        }

        // Unused placeholder period when no interval is configured.
        let mut ticker = interval(period.unwrap_or(Duration::from_secs(3600)));
        let periodic = period.is_some();

        loop {
            let cause = tokio::select! {
                Some(()) = trigger_rx.recv() => "trigger",
                _ = ticker.tick(), if periodic => "interval",
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                _ = run_once(&prober, &status_tx, cause) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    status_tx.send_modify(|status| {
                        status.state = ProbeState::Failed;
                        status.last_error = Some("Probe run interrupted by shutdown".to_string());
                        status.updated_at = Utc::now();
                    });
                    break;
                }
            }
        }

        info!("Proxy probe service shutting down");
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
}

async fn run_once(prober: &ProxyProber, status_tx: &watch::Sender<ProbeStatus>, cause: &str) {
    info!(cause, "Proxy probe run started");
    status_tx.send_modify(|status| {
        status.state = ProbeState::Running;
        status.updated_at = Utc::now();
    });

    let result = prober.run().await;

    status_tx.send_modify(|status| {
        status.runs += 1;
        status.updated_at = Utc::now();
        match result {
            Ok(report) => {
                status.state = ProbeState::Completed;
                status.last_report = Some(report);
                status.last_error = None;
            }
            Err(e) => {
                error!("Proxy probe run failed: {}", e);
                status.state = ProbeState::Failed;
                status.last_error = Some(e.to_string());
            }
        }
    });
}

/// Cloneable handle used by the HTTP layer
#[derive(Clone)]
pub struct ProbeRunnerHandle {
    trigger_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<ProbeStatus>,
}

impl ProbeRunnerHandle {
    /// Request a probe run without waiting for it
    pub fn trigger(&self) -> Result<TriggerOutcome> {
        match self.trigger_tx.try_send(()) {
            Ok(()) => Ok(TriggerOutcome::Queued),
            Err(mpsc::error::TrySendError::Full(())) => Ok(TriggerOutcome::AlreadyQueued),
            Err(mpsc::error::TrySendError::Closed(())) => Err(HubError::Internal(
                "proxy probe service is not running".to_string(),
            )),
        }
    }

    pub fn status(&self) -> ProbeStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProbeStatus> {
        self.status_rx.clone()
    }
}
