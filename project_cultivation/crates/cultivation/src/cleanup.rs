//! Offline cleanup pipeline.
//!
//! Order matters: accrual is re-anchored and resource caches are flushed
//! before the presence entry goes away, since other workers key off it.
//! Every step is best-effort.

use std::sync::Arc;

use cache::CacheStore;
use presence::{OfflineEvent, OfflineRx, PlayerId, PresenceTracker};
use tokio::sync::watch;

use crate::keys::player_cleanup_patterns;
use crate::resources::{EquipmentResources, PetResources, ResourceCache};
use crate::service::GameServices;
use crate::spirit::SpiritEngine;

/// What one cleanup pass managed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub keys_removed: usize,
    pub failed_steps: usize,
    /// The player logged in again after the notification; nothing was touched.
    pub superseded: bool,
}

pub struct CleanupWorker {
    cache: Arc<CacheStore>,
    presence: Arc<PresenceTracker>,
    resources: Arc<ResourceCache>,
    spirit: Arc<SpiritEngine>,
}

impl CleanupWorker {
    pub fn new(services: &GameServices) -> Self {
        Self {
            cache: services.cache.clone(),
            presence: services.presence.clone(),
            resources: services.resources.clone(),
            spirit: services.spirit.clone(),
        }
    }

    pub fn cleanup_player(&self, player_id: PlayerId) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Err(e) = self.spirit.refresh_anchor(player_id) {
            tracing::warn!(player_id, "cleanup: spirit anchor not saved: {}", e);
            report.failed_steps += 1;
        }
        if let Err(e) = self.resources.flush_and_evict::<EquipmentResources>(player_id) {
            tracing::warn!(player_id, "cleanup: equipment resources not flushed: {}", e);
            report.failed_steps += 1;
        }
        if let Err(e) = self.resources.flush_and_evict::<PetResources>(player_id) {
            tracing::warn!(player_id, "cleanup: pet resources not flushed: {}", e);
            report.failed_steps += 1;
        }
        for pattern in player_cleanup_patterns(player_id) {
            match self.cache.del_matching(&pattern) {
                Ok(n) => report.keys_removed += n,
                Err(e) => {
                    tracing::warn!(player_id, pattern = %pattern, "cleanup: key purge failed: {}", e);
                    report.failed_steps += 1;
                }
            }
        }
        if let Err(e) = self.presence.remove_entry(player_id) {
            tracing::warn!(player_id, "cleanup: presence entry not removed: {}", e);
            report.failed_steps += 1;
        }

        tracing::info!(
            player_id,
            keys_removed = report.keys_removed,
            failed_steps = report.failed_steps,
            "player cleaned up"
        );
        report
    }

    /// Clean up after one notification, unless a newer login owns the
    /// player's caches by now.
    pub fn handle(&self, event: &OfflineEvent) -> CleanupReport {
        tracing::debug!(player_id = event.player_id, reason = ?event.reason, "offline notification");
        match self.presence.relogged_since(event.player_id, event.at) {
            Ok(true) => {
                tracing::info!(player_id = event.player_id, "stale offline notification skipped");
                return CleanupReport {
                    superseded: true,
                    ..CleanupReport::default()
                };
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(player_id = event.player_id, "cleanup: presence lookup failed: {}", e),
        }
        self.cleanup_player(event.player_id)
    }

    /// Drain offline notifications until shutdown or until every sender is
    /// gone.
    pub async fn run(self, mut rx: OfflineRx, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        self.handle(&event);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Notifications that raced the shutdown still get cleaned up.
        while let Ok(event) = rx.try_recv() {
            self.handle(&event);
        }
        tracing::info!("cleanup worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::with_db;
    use crate::resources::ResourceField;
    use crate::testutil::TestWorld;
    use crate::SessionKey;
    use cache::Clock;
    use std::time::Duration;

    #[test]
    fn timeout_pipeline_flushes_and_purges() {
        let mut world = TestWorld::new();
        let view = world.register("Drifter", "lotus").unwrap();
        let opponent = world.register("Other", "lotus").unwrap();
        let pid = view.id;
        world.login("Drifter", "lotus", "10.0.0.3").unwrap();
        world
            .resources
            .decrement::<EquipmentResources>(pid, ResourceField::ReinforceStones, 100)
            .unwrap();
        world.battle.start_pvp(pid, opponent.id).unwrap();
        let unrelated = SessionKey::pvp(opponent.id, pid);
        world.battle.start_pvp(opponent.id, pid).unwrap();

        world.clock.advance(Duration::from_secs(11));
        assert_eq!(world.presence.sweep().unwrap(), vec![pid]);
        let event = world.offline_rx.try_recv().unwrap();

        let worker = CleanupWorker::new(&world);
        let report = worker.handle(&event);
        assert_eq!(report.failed_steps, 0);
        // The session plus the equipment last-operation marker.
        assert_eq!(report.keys_removed, 2);

        let stored = with_db(&world.db, |db| db.player().load(pid)).unwrap();
        assert_eq!(stored.reinforce_stones, 900);
        assert_eq!(stored.last_spirit_gain_time, world.clock.now_millis());
        assert!(world.cache.scan(&format!("session:*:{pid}:*")).unwrap().is_empty());
        assert!(world.cache.scan(&format!("res:*:{pid}")).unwrap().is_empty());
        assert!(world.presence.entry(pid).unwrap().is_none());
        // Sessions where the player is only the opponent are left alone.
        assert!(world.battle.session(&unrelated).unwrap().is_some());
    }

    #[test]
    fn relogin_before_cleanup_keeps_the_new_session() {
        let mut world = TestWorld::new();
        let view = world.register("Returner", "lotus").unwrap();
        let pid = view.id;
        world.login("Returner", "lotus", "10.0.0.4").unwrap();
        world.logout(pid).unwrap();
        let stale = world.offline_rx.try_recv().unwrap();

        world.clock.advance(Duration::from_millis(200));
        world.login("Returner", "lotus", "10.0.0.4").unwrap();
        world
            .resources
            .decrement::<EquipmentResources>(pid, ResourceField::ReinforceStones, 10)
            .unwrap();

        let report = CleanupWorker::new(&world).handle(&stale);
        assert!(report.superseded);
        assert_eq!(report.keys_removed, 0);
        assert!(world.presence.is_online(pid).unwrap());
        assert_eq!(world.resources.get::<EquipmentResources>(pid).unwrap().reinforce_stones, 990);
    }

    #[test]
    fn relogin_in_the_same_millisecond_still_wins() {
        let mut world = TestWorld::new();
        let view = world.register("Quick", "lotus").unwrap();
        world.login("Quick", "lotus", "x").unwrap();
        world.logout(view.id).unwrap();
        let stale = world.offline_rx.try_recv().unwrap();
        world.login("Quick", "lotus", "x").unwrap();

        assert!(CleanupWorker::new(&world).handle(&stale).superseded);
        assert!(world.presence.is_online(view.id).unwrap());
    }

    #[test]
    fn cleanup_of_unknown_player_is_harmless() {
        let world = TestWorld::new();
        let worker = CleanupWorker::new(&world);
        let report = worker.cleanup_player(404);
        assert_eq!(report.keys_removed, 0);
        // Only the durable anchor write can fail for a missing row.
        assert_eq!(report.failed_steps, 1);
    }

    #[tokio::test]
    async fn worker_runs_until_shutdown() {
        let world = TestWorld::new();
        let view = world.register("Leaver", "lotus").unwrap();
        world.login("Leaver", "lotus", "x").unwrap();

        let worker = CleanupWorker::new(&world);
        let (tx, rx) = presence::offline_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(worker.run(rx, stop_rx));

        world.clock.advance(Duration::from_secs(1));
        tx.send(OfflineEvent {
            player_id: view.id,
            reason: presence::OfflineReason::Logout,
            at: world.clock.now_millis(),
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(world.presence.entry(view.id).unwrap().is_none());

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
