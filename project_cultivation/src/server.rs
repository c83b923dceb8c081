use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use axum::Router;
use cultivation::{CachePurgeJob, CleanupWorker, GameServices, ResourceSyncJob, SpiritAccrualJob};
use engine_core::{spawn_tick_thread, TickConfig, TickJob};
use net::{push_routes, NetRx, PushState};
use presence::PresenceSweepJob;
use tower_http::cors::CorsLayer;

use crate::api::api_routes;
use crate::config::ServerConfig;
use crate::shutdown::ShutdownRx;

/// Background tick threads, joined on shutdown.
pub struct JobThreads {
    handles: Vec<(&'static str, JoinHandle<u64>)>,
}

impl JobThreads {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Threads notice the shutdown flag within one poll interval.
    pub fn join(self) {
        for (name, handle) in self.handles {
            match handle.join() {
                Ok(ticks) => tracing::info!(job = name, ticks, "job stopped"),
                Err(_) => tracing::error!(job = name, "job thread panicked"),
            }
        }
    }
}

fn spawn<J: TickJob + 'static>(
    threads: &mut JobThreads,
    interval: Duration,
    job: J,
    shutdown: &ShutdownRx,
) -> std::io::Result<()> {
    let name = job.name();
    let handle = spawn_tick_thread(TickConfig::every(interval), job, shutdown.stop_flag())?;
    threads.handles.push((name, handle));
    Ok(())
}

/// Spirit accrual, presence sweep, resource sync and cache purge.
pub fn spawn_jobs(
    config: &ServerConfig,
    services: &GameServices,
    shutdown: &ShutdownRx,
) -> std::io::Result<JobThreads> {
    let mut threads = JobThreads { handles: Vec::new() };
    spawn(
        &mut threads,
        Duration::from_millis(config.spirit.tick_interval_ms),
        SpiritAccrualJob::new(services.spirit.clone()),
        shutdown,
    )?;
    spawn(
        &mut threads,
        Duration::from_secs(config.presence.sweep_interval_secs),
        PresenceSweepJob::new(services.presence.clone()),
        shutdown,
    )?;
    spawn(
        &mut threads,
        Duration::from_secs(config.resources.sync_interval_secs),
        ResourceSyncJob::new(services.resources.clone()),
        shutdown,
    )?;
    spawn(
        &mut threads,
        Duration::from_secs(config.cache.purge_interval_secs),
        CachePurgeJob::new(services.cache.clone()),
        shutdown,
    )?;
    Ok(threads)
}

/// Feed push-connection events into presence until every sender is gone or
/// shutdown fires.
pub async fn run_net_bridge(services: Arc<GameServices>, mut net_rx: NetRx, mut shutdown: ShutdownRx) {
    loop {
        tokio::select! {
            event = net_rx.recv() => match event {
                Some(event) => services.handle_net_event(event),
                None => break,
            },
            _ = shutdown.wait() => break,
        }
    }
    tracing::info!("net bridge stopped");
}

/// Run every online player through the cleanup pipeline so cached
/// mutations reach the database before exit.
pub fn flush_online_players(services: &GameServices) -> usize {
    let online = match services.presence.list_online() {
        Ok(online) => online,
        Err(e) => {
            tracing::error!(error = %e, "could not list online players at shutdown");
            return 0;
        }
    };
    let worker = CleanupWorker::new(services);
    for &player_id in &online {
        worker.cleanup_player(player_id);
    }
    online.len()
}

/// Push endpoint plus the JSON API.
pub fn build_router(services: Arc<GameServices>, push: PushState) -> Router {
    Router::new()
        .merge(push_routes(push))
        .merge(api_routes(services))
        .layer(CorsLayer::permissive())
}

pub fn spawn_cleanup_worker(
    services: &GameServices,
    offline_rx: presence::OfflineRx,
    shutdown: &ShutdownRx,
) -> tokio::task::JoinHandle<()> {
    let worker = CleanupWorker::new(services);
    tokio::spawn(worker.run(offline_rx, shutdown.clone().into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use cache::{CacheStore, ManualClock};
    use cultivation::{Catalog, ServicesConfig};
    use net::{net_channel, NetEvent};
    use player_db::PlayerDb;

    fn services() -> (Arc<GameServices>, presence::OfflineRx) {
        let cache = Arc::new(CacheStore::new(ManualClock::new(1_700_000_000_000)));
        let db = PlayerDb::open_memory().unwrap();
        let (services, offline_rx) = GameServices::new(&ServicesConfig::default(), cache, db, Catalog::default());
        (Arc::new(services), offline_rx)
    }

    #[test]
    fn jobs_start_and_stop() {
        let (services, _rx) = services();
        let (tx, rx) = shutdown_channel();
        let threads = spawn_jobs(&ServerConfig::default(), &services, &rx).unwrap();
        assert_eq!(threads.len(), 4);
        tx.trigger();
        threads.join();
    }

    #[test]
    fn shutdown_flush_cleans_online_players() {
        let (services, _rx) = services();
        let view = services.register("Azure", "lotus").unwrap();
        services.login("Azure", "lotus", "x").unwrap();
        assert_eq!(flush_online_players(&services), 1);
        assert!(!services.presence.is_online(view.id).unwrap());
        assert!(services.presence.entry(view.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn net_bridge_marks_disconnects_offline() {
        let (services, _offline_rx) = services();
        let view = services.register("Azure", "lotus").unwrap();
        services.login("Azure", "lotus", "x").unwrap();

        let (net_tx, net_rx) = net_channel();
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let bridge = tokio::spawn(run_net_bridge(services.clone(), net_rx, shutdown_rx));
        net_tx
            .send(NetEvent::Disconnected {
                player_id: view.id,
                conn_id: 1,
                cause: net::DisconnectCause::Closed,
            })
            .unwrap();
        drop(net_tx);
        bridge.await.unwrap();
        assert!(!services.presence.is_online(view.id).unwrap());
    }
}
