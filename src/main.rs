//! Dramahub - Entry Point
//!
//! Starts the API server and the proxy probe runner with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dramahub::aggregate::Aggregator;
use dramahub::api::{ApiServer, AppState};
use dramahub::config::LogConfig;
use dramahub::proxy::{ProxyPool, ProxyProber, ReqwestTransport, ResilientFetcher, SystemClock};
use dramahub::registry::{DisabledRegistry, HttpRegistry, ProxyRegistry};
use dramahub::services::ProbeRunner;
use dramahub::sources::SourceSet;
use dramahub::Config;

#[tokio::main]
async fn main() -> dramahub::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log);

    info!("Starting Dramahub");

    let registry: Arc<dyn ProxyRegistry> = match HttpRegistry::from_config(&config.registry)? {
        Some(registry) => {
            info!(collection = %config.registry.collection, "Proxy registry configured");
            Arc::new(registry)
        }
        None => {
            warn!("No proxy registry configured, gated sources will be fetched directly");
            Arc::new(DisabledRegistry)
        }
    };

    let clock = Arc::new(SystemClock);
    let transport = Arc::new(ReqwestTransport::new()?);

    let pool = Arc::new(ProxyPool::new(registry.clone(), clock.clone(), &config.pool));
    let fetcher = Arc::new(ResilientFetcher::new(
        pool.clone(),
        transport.clone(),
        &config.pool,
    ));

    let sources = SourceSet::from_config(&config.sources)?;
    let aggregator = Arc::new(Aggregator::new(
        fetcher,
        sources,
        config.sources.order.clone(),
    ));

    let prober = ProxyProber::new(transport, registry, clock, config.prober.clone());
    let (probe_runner, probe_handle) = ProbeRunner::new(prober, config.prober.interval);

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);

    let probe_shutdown = shutdown_tx.subscribe();
    let probe_task = tokio::spawn(async move {
        probe_runner.run(probe_shutdown).await;
    });

    let api_server = ApiServer::new(
        config.api.clone(),
        AppState {
            aggregator,
            pool,
            prober: probe_handle,
        },
    );

    let api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started - API: {}:{}", config.api.host, config.api.port);

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);

    // Wait for all tasks to complete
    let _ = tokio::join!(api_task, probe_task);

    info!("Dramahub stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dramahub={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
