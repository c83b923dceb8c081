use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cache::{CacheStore, SystemClock};
use cultivation::GameServices;
use net::{net_channel, PushState};
use player_db::PlayerDb;
use project_cultivation::config::parse_cli_args;
use project_cultivation::server::{
    build_router, flush_online_players, run_net_bridge, spawn_cleanup_worker, spawn_jobs,
};
use project_cultivation::shutdown::{shutdown_channel, wait_for_signal};

/// Upper bound on HTTP drain after the signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let config = parse_cli_args();
    observability::init_logging(&config.log.level);
    tracing::info!("Cultivation server starting...");

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let catalog = match config.load_catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("Failed to load catalog: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
        }
    }
    let db = match PlayerDb::open(&config.database.path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open player database: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(path = %config.database.path, "Player database opened");

    let cache = Arc::new(CacheStore::with_shards(SystemClock::shared(), config.cache.shards));
    let (services, offline_rx) = GameServices::new(&config.to_services_config(), cache, db, catalog);
    let services = Arc::new(services);

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let jobs = match spawn_jobs(&config, &services, &shutdown_rx) {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("Failed to spawn job threads: {}", e);
            std::process::exit(1);
        }
    };
    let cleanup = spawn_cleanup_worker(&services, offline_rx, &shutdown_rx);

    let (net_tx, net_rx) = net_channel();
    let bridge = tokio::spawn(run_net_bridge(services.clone(), net_rx, shutdown_rx.clone()));
    let push = PushState {
        hub: services.hub.clone(),
        net_tx,
        clock: services.clock.clone(),
        config: config.to_push_config(),
    };
    let app = build_router(services.clone(), push);

    let listener = match tokio::net::TcpListener::bind(&config.net.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.net.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on {}", config.net.bind_addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { server_shutdown.wait().await })
            .await
    });

    wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping server...");
    shutdown_tx.trigger();

    let _ = cleanup.await;
    let _ = bridge.await;
    let flushed = flush_online_players(&services);
    tracing::info!(players = flushed, "Online players flushed");

    // Tick threads poll the flag; joining blocks, so keep it off the runtime.
    let _ = tokio::task::spawn_blocking(move || jobs.join()).await;

    match tokio::time::timeout(DRAIN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("Server error: {}", e),
        Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
        Err(_) => tracing::warn!("HTTP drain timed out"),
    }

    tracing::info!("Server stopped.");
}
