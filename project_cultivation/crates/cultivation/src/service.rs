//! The assembled game core and the account lifecycle (register, login,
//! heartbeat, logout).

use std::sync::Arc;
use std::time::Duration;

use cache::{CacheStore, SharedClock};
use net::{NetEvent, PushHub};
use player_db::{BattleRecord, PlayerDb, PlayerRecord};
use presence::{offline_channel, OfflineRx, PlayerId, PresenceConfig, PresenceTracker};
use serde::Serialize;

use crate::attributes::CombatBundle;
use crate::battle::{BattleConfig, BattleEngine};
use crate::catalog::Catalog;
use crate::db::{shared, with_db, SharedDb};
use crate::error::GameError;
use crate::resources::ResourceCache;
use crate::spirit::SpiritEngine;
use crate::round1;

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub presence: PresenceConfig,
    pub resource_ttl: Duration,
    pub lock_ttl: Duration,
    pub spirit_base_rate: f64,
    pub battle: BattleConfig,
    pub push_queue_capacity: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            presence: PresenceConfig::default(),
            resource_ttl: Duration::from_secs(20),
            lock_ttl: Duration::from_secs(20),
            spirit_base_rate: 1.0,
            battle: BattleConfig::default(),
            push_queue_capacity: net::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Client-facing view of a player row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub username: String,
    pub level: u32,
    pub realm: String,
    pub cultivation: f64,
    pub max_cultivation: f64,
    pub spirit: f64,
    pub spirit_rate: f64,
    pub spirit_stones: i64,
    pub reinforce_stones: i64,
    pub refinement_stones: i64,
    pub pet_essence: i64,
    pub combat: CombatBundle,
}

impl PlayerView {
    pub fn from_record(record: &PlayerRecord) -> Result<Self, GameError> {
        Ok(Self {
            id: record.id,
            username: record.username.clone(),
            level: record.level,
            realm: record.realm.clone(),
            cultivation: round1(record.cultivation),
            max_cultivation: record.max_cultivation,
            spirit: round1(record.spirit),
            spirit_rate: record.spirit_rate,
            spirit_stones: record.spirit_stones,
            reinforce_stones: record.reinforce_stones,
            refinement_stones: record.refinement_stones,
            pet_essence: record.pet_essence,
            combat: CombatBundle::from_value(&record.combat_attributes)?,
        })
    }
}

/// One row of battle history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecordView {
    pub id: i64,
    pub opponent_id: i64,
    pub opponent_name: String,
    pub result: &'static str,
    pub kind: &'static str,
    pub rewards: serde_json::Value,
    pub created_at: i64,
}

impl From<&BattleRecord> for BattleRecordView {
    fn from(record: &BattleRecord) -> Self {
        Self {
            id: record.id,
            opponent_id: record.opponent_id,
            opponent_name: record.opponent_name.clone(),
            result: record.result.as_str(),
            kind: record.kind.as_str(),
            // Opaque text stays a string when it is not JSON.
            rewards: serde_json::from_str(&record.rewards)
                .unwrap_or_else(|_| serde_json::Value::String(record.rewards.clone())),
            created_at: record.created_at,
        }
    }
}

/// Every long-lived component, shared by handlers and background jobs.
pub struct GameServices {
    pub clock: SharedClock,
    pub cache: Arc<CacheStore>,
    pub db: SharedDb,
    pub catalog: Arc<Catalog>,
    pub presence: Arc<PresenceTracker>,
    pub hub: Arc<PushHub>,
    pub resources: Arc<ResourceCache>,
    pub spirit: Arc<SpiritEngine>,
    pub battle: Arc<BattleEngine>,
    pub lock_ttl: Duration,
}

impl GameServices {
    /// Wire the components. The returned receiver carries offline
    /// notifications for the cleanup worker.
    pub fn new(
        config: &ServicesConfig,
        cache: Arc<CacheStore>,
        db: PlayerDb,
        catalog: Catalog,
    ) -> (Self, OfflineRx) {
        let clock = cache.clock().clone();
        let db = shared(db);
        let catalog = Arc::new(catalog);
        let (offline_tx, offline_rx) = offline_channel();
        let presence = Arc::new(
            PresenceTracker::new(cache.clone(), config.presence.clone()).with_offline_tx(offline_tx),
        );
        let hub = Arc::new(PushHub::new(config.push_queue_capacity));
        let resources = Arc::new(ResourceCache::new(cache.clone(), db.clone(), config.resource_ttl));
        let spirit = Arc::new(SpiritEngine::new(
            presence.clone(),
            db.clone(),
            hub.clone(),
            clock.clone(),
            config.spirit_base_rate,
        ));
        let battle = Arc::new(BattleEngine::new(
            cache.clone(),
            db.clone(),
            catalog.clone(),
            hub.clone(),
            clock.clone(),
            config.battle.clone(),
        ));

        let services = Self {
            clock,
            cache,
            db,
            catalog,
            presence,
            hub,
            resources,
            spirit,
            battle,
            lock_ttl: config.lock_ttl,
        };
        (services, offline_rx)
    }

    pub fn register(&self, username: &str, password: &str) -> Result<PlayerView, GameError> {
        let username = username.trim();
        if username.is_empty() || username.len() > 32 {
            return Err(GameError::InvalidRequest("username must be 1-32 characters".into()));
        }
        if password.len() < 4 {
            return Err(GameError::InvalidRequest("password too short".into()));
        }
        let starter = self.catalog.new_player(self.clock.now_millis());
        let record = with_db(&self.db, |db| db.player().create(username, password, &starter))?;
        PlayerView::from_record(&record)
    }

    /// Authenticate, mark online, re-anchor accrual and warm the resource
    /// caches.
    pub fn login(&self, username: &str, password: &str, addr: &str) -> Result<PlayerView, GameError> {
        let record = with_db(&self.db, |db| db.player().authenticate(username, password))?;
        self.presence.login(record.id, addr)?;
        self.spirit.refresh_anchor(record.id)?;
        self.resources.hydrate_all(record.id)?;
        tracing::info!(player_id = record.id, addr, "player logged in");
        self.player(record.id)
    }

    /// Refresh presence and keep the resource caches alive for as long as the
    /// player is.
    pub fn heartbeat(&self, player_id: PlayerId) -> Result<(), GameError> {
        self.presence.heartbeat(player_id)?;
        self.resources.touch(player_id)
    }

    /// Returns whether the player was online. Cleanup runs on the offline
    /// notification.
    pub fn logout(&self, player_id: PlayerId) -> Result<bool, GameError> {
        Ok(self.presence.logout(player_id)?)
    }

    pub fn player(&self, player_id: PlayerId) -> Result<PlayerView, GameError> {
        let record = with_db(&self.db, |db| db.player().load(player_id))?;
        PlayerView::from_record(&record)
    }

    /// Newest first.
    pub fn battle_history(&self, player_id: PlayerId, limit: u32) -> Result<Vec<BattleRecordView>, GameError> {
        let records = with_db(&self.db, |db| {
            db.player().load(player_id)?;
            db.battle_record().list_for_player(player_id, limit)
        })?;
        Ok(records.iter().map(BattleRecordView::from).collect())
    }

    /// Push connections count as heartbeats. A dropped socket only takes the
    /// player offline when no newer connection replaced it.
    pub fn handle_net_event(&self, event: NetEvent) {
        match event {
            NetEvent::Connected { player_id, .. } | NetEvent::Ping { player_id } => {
                match self.heartbeat(player_id) {
                    Ok(()) => {}
                    Err(GameError::NotOnline(_)) => {
                        tracing::debug!(player_id, "push traffic from a player who is not logged in");
                    }
                    Err(e) => tracing::warn!(player_id, error = %e, "push heartbeat failed"),
                }
            }
            NetEvent::Disconnected {
                player_id,
                conn_id,
                cause,
            } => {
                if self.hub.is_connected(player_id) {
                    tracing::debug!(player_id, conn_id, "stale push connection closed");
                    return;
                }
                match self.presence.disconnect(player_id) {
                    Ok(true) => tracing::info!(player_id, conn_id, ?cause, "push connection lost"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(player_id, error = %e, "disconnect bookkeeping failed"),
                }
            }
        }
    }

    /// Gate for operations that need a live session.
    pub fn require_online(&self, player_id: PlayerId) -> Result<(), GameError> {
        if self.presence.is_online(player_id)? {
            Ok(())
        } else {
            Err(GameError::NotOnline(player_id))
        }
    }
}
