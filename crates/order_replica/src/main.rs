//! Order replica entry point.
//!
//! Bootstraps the replica from the newest snapshot, then follows the update
//! stream, enriching orders through their order book's on-chain source and
//! publishing snapshots periodically and on demand over HTTP.

use anyhow::Result;
use external_services::{EthRpcClient, RedisStreamLog, SharedRedisClient, StreamLog};
use metrics_exporter_prometheus::PrometheusBuilder;
use order_replica::{
    create_router, wait_until_ready, AppState, Enricher, Erc20Source, RedisReadinessProbe,
    ReplicaConfig, ReplicaService, ReplicaStore, RpcReadinessProbe, SnapshotManager,
    SourceRegistry, SNAPSHOT_FIELD, UPDATE_FIELD,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delay before the first snapshot, giving the consumer a head start.
const INITIAL_SNAPSHOT_DELAY: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order replica...");

    let config = ReplicaConfig::from_env()?;

    // Initialize Prometheus metrics
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;

    info!(
        "Prometheus metrics available at http://0.0.0.0:{}/metrics",
        config.metrics_port
    );

    // Wait for dependencies
    let rpc = EthRpcClient::new(&config.rpc_url);
    let redis = SharedRedisClient::new(&config.redis_url)?;
    wait_until_ready(&RpcReadinessProbe::new(rpc.clone()), config.readiness_interval).await;
    wait_until_ready(&RedisReadinessProbe::new(redis.clone()), config.readiness_interval).await;

    let update_log: Arc<dyn StreamLog> = Arc::new(
        RedisStreamLog::new(redis.clone(), &config.update_stream, UPDATE_FIELD)
            .with_block_ms(config.read_block_ms),
    );
    let snapshot_log: Arc<dyn StreamLog> =
        Arc::new(RedisStreamLog::new(redis, &config.snapshot_stream, SNAPSHOT_FIELD));

    // Bootstrap from the newest snapshot
    let snapshots = Arc::new(
        SnapshotManager::new(snapshot_log)
            .with_retry_delay(config.snapshot_retry)
            .with_require_snapshot(config.require_snapshot),
    );
    let loaded = snapshots.load_latest().await;
    let store = loaded.store;

    // Register on-chain sources
    let mut registry = SourceRegistry::new();
    for (family, spender) in &config.order_book_spenders {
        registry.register(Arc::new(Erc20Source::new(family, rpc.clone(), spender)?));
    }

    let enricher = Arc::new(Enricher::new(store.clone(), registry, update_log.clone()));
    info!("On-chain sources: {:?}", enricher.registry().families());

    if loaded.found && config.enrich_on_start {
        info!("Enriching orders loaded from snapshot...");
        enricher.enrich_all().await;
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let service = ReplicaService::new(
        store.clone(),
        update_log,
        enricher,
        config.service_config(),
        shutdown_rx,
    );
    let mut service_handle = tokio::spawn(service.run());

    info!(
        "ReplicaService spawned, consuming '{}' after {}",
        config.update_stream, loaded.cursor
    );

    let snapshot_handle = spawn_snapshot_task(store.clone(), snapshots.clone(), config.snapshot_interval);

    // Create HTTP server
    let app_state = AppState { store, snapshots };
    let router = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    info!("HTTP API listening on http://0.0.0.0:{}", config.http_port);
    info!("Available endpoints:");
    info!("  GET  /health        - Health check");
    info!("  GET  /stats         - Replica statistics");
    info!("  GET  /orders        - All orders");
    info!("  GET  /order/{{hash}}  - One order");
    info!("  POST /snapshot      - Publish a snapshot now");

    let server = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
    };

    // A consumer that stops on its own has hit a fatal read failure.
    let outcome = tokio::select! {
        result = server => {
            result?;
            service_handle.await?
        }
        result = &mut service_handle => result?,
    };

    snapshot_handle.abort();

    if let Err(e) = outcome {
        error!("ReplicaService failed: {}", e);
        return Err(e.into());
    }

    info!("Order replica stopped");
    Ok(())
}

/// Publish a snapshot shortly after start, then every `interval`.
fn spawn_snapshot_task(
    store: ReplicaStore,
    snapshots: Arc<SnapshotManager>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(INITIAL_SNAPSHOT_DELAY).await;
        if let Err(e) = snapshots.publish(&store).await {
            warn!("Initial snapshot failed: {}", e);
        }

        if interval.is_zero() {
            info!("Periodic snapshots disabled");
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = snapshots.publish(&store).await {
                warn!("Snapshot failed, retrying next interval: {}", e);
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal(shutdown_tx: mpsc::Sender<()>) {
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(()).await;
}
