//! Session lifecycle: start, paced steps, terminal handling and rewards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cache::{CacheStore, Clock, SharedClock};
use net::protocol::{DungeonEvent, DungeonEventType, PushEvent, PushMessage};
use net::PushHub;
use player_db::{BattleKind, BattleResult, NewBattleRecord, PlayerRecord, VictoryGrant};
use presence::PlayerId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::formula::{resolve_round, RoundReport};
use super::rewards::{roll_pve, roll_pvp, RewardItem, VictoryRewards};
use super::session::{BattleSession, Combatant, SessionKey};
use crate::attributes::CombatBundle;
use crate::catalog::Catalog;
use crate::db::{with_db, SharedDb};
use crate::error::GameError;
use crate::round1;

const DAY_MILLIS: i64 = 86_400_000;

#[derive(Debug, Clone)]
pub struct BattleConfig {
    pub session_ttl: Duration,
    /// Steps closer together than this wait out the remainder.
    pub min_round_interval: Duration,
    /// Reaching this many rounds without a winner is a loss for the player.
    pub max_rounds: u32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60 * 60),
            min_round_interval: Duration::from_secs(1),
            max_rounds: 100,
        }
    }
}

/// Response for `start` and `step`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundData {
    pub kind: &'static str,
    pub player_id: PlayerId,
    pub opponent_id: i64,
    pub opponent_name: String,
    pub round: u32,
    pub player_hp: f64,
    pub player_max_hp: f64,
    pub opponent_hp: f64,
    pub opponent_max_hp: f64,
    /// Lines produced by this call only.
    pub log: Vec<String>,
    pub battle_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<bool>,
    pub rewards: Vec<RewardItem>,
}

impl RoundData {
    fn from_session(key: &SessionKey, session: &BattleSession, log: Vec<String>) -> Self {
        Self {
            kind: key.kind.as_str(),
            player_id: key.player_id,
            opponent_id: key.opponent_id,
            opponent_name: session.opponent.name.clone(),
            round: session.round,
            player_hp: round1(session.player.hp),
            player_max_hp: round1(session.player.max_hp),
            opponent_hp: round1(session.opponent.hp),
            opponent_max_hp: round1(session.opponent.max_hp),
            log,
            battle_ended: false,
            victory: None,
            rewards: Vec::new(),
        }
    }
}

/// Start of the UTC day containing `now`.
pub fn day_start_millis(now: i64) -> i64 {
    now - now.rem_euclid(DAY_MILLIS)
}

pub struct BattleEngine {
    cache: Arc<CacheStore>,
    db: SharedDb,
    catalog: Arc<Catalog>,
    hub: Arc<PushHub>,
    clock: SharedClock,
    config: BattleConfig,
    rng: Mutex<StdRng>,
}

impl BattleEngine {
    pub fn new(
        cache: Arc<CacheStore>,
        db: SharedDb,
        catalog: Arc<Catalog>,
        hub: Arc<PushHub>,
        clock: SharedClock,
        config: BattleConfig,
    ) -> Self {
        Self {
            cache,
            db,
            catalog,
            hub,
            clock,
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the random source (seeded runs).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn start_pvp(&self, player_id: PlayerId, opponent_id: PlayerId) -> Result<RoundData, GameError> {
        if player_id == opponent_id {
            return Err(GameError::InvalidRequest("cannot duel yourself".into()));
        }
        let key = SessionKey::pvp(player_id, opponent_id);
        self.ensure_idle(&key)?;

        let (attacker, defender) = with_db(&self.db, |db| {
            Ok((db.player().load(player_id)?, db.player().load(opponent_id)?))
        })?;
        let policy = &self.catalog.policy;
        self.check_daily_limit(player_id, BattleKind::Pvp, policy.daily_duel_limit)?;

        let session = BattleSession::new(
            combatant(&attacker)?,
            combatant(&defender)?,
            self.clock.now_millis(),
        );
        self.open(&key, session, policy.duel_spirit_cost)
    }

    pub fn start_pve(&self, player_id: PlayerId, monster_id: i64) -> Result<RoundData, GameError> {
        let monster = self
            .catalog
            .monster(monster_id)
            .ok_or_else(|| GameError::NotFound(format!("monster {monster_id}")))?;
        let key = SessionKey::pve(player_id, monster_id);
        self.ensure_idle(&key)?;

        let player = with_db(&self.db, |db| db.player().load(player_id))?;
        let policy = &self.catalog.policy;
        self.check_daily_limit(player_id, BattleKind::Pve, policy.daily_pve_limit)?;

        let session = BattleSession::new(
            combatant(&player)?,
            Combatant::new(monster.id, monster.name.clone(), monster.level, monster.stats),
            self.clock.now_millis(),
        );
        let data = self.open(&key, session, policy.pve_spirit_cost)?;
        self.push_dungeon(
            &key,
            &data,
            DungeonEventType::Start,
            format!("{} encounters {}", player.username, monster.name),
            (0.0, 0.0),
            Vec::new(),
        );
        Ok(data)
    }

    /// Resolve one round. Waits out the minimum gap since the previous step.
    pub async fn step(&self, key: &SessionKey) -> Result<RoundData, GameError> {
        let mut session = self.load(key)?;
        if session.is_over() {
            return Err(GameError::BattleOver(key.cache_key()));
        }
        self.pace(key).await?;

        session.round += 1;
        let report = if session.round > self.config.max_rounds {
            session.player.hp = 0.0;
            RoundReport {
                lines: vec![format!(
                    "round {}: time runs out, {} is defeated",
                    session.round, session.player.name
                )],
                ..RoundReport::default()
            }
        } else {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            resolve_round(&mut session, &mut *rng)
        };
        session.log.extend(report.lines.iter().cloned());

        let now = self.clock.now_millis();
        let ttl = self.config.session_ttl;
        self.cache.set_json_ex(&key.cache_key(), &session, ttl)?;
        self.cache.set_ex(&key.last_round_key(), now.to_string(), ttl)?;

        let mut data = RoundData::from_session(key, &session, report.lines.clone());
        let damage = (report.damage_dealt, report.damage_taken);
        if key.kind == BattleKind::Pve {
            self.push_dungeon(
                key,
                &data,
                DungeonEventType::CombatRound,
                report.lines.join("; "),
                damage,
                Vec::new(),
            );
        }
        if !session.is_over() {
            return Ok(data);
        }

        if let Err(e) = self.cache.del(&key.last_round_key()) {
            tracing::warn!(session = %key.cache_key(), "failed to clear round marker: {}", e);
        }
        let victory = session.player.is_alive();
        data.battle_ended = true;
        data.victory = Some(victory);

        if victory {
            let rewards = self.grant(key, &session, now);
            data.rewards = rewards.items();
            if key.kind == BattleKind::Pve {
                self.push_dungeon(
                    key,
                    &data,
                    DungeonEventType::Victory,
                    format!("{} is vanquished", session.opponent.name),
                    damage,
                    Vec::new(),
                );
                if !rewards.loot.is_empty() || rewards.spirit_stones > 0 {
                    self.push_dungeon(
                        key,
                        &data,
                        DungeonEventType::Treasure,
                        "spoils collected".to_string(),
                        damage,
                        rewards.labels(),
                    );
                }
            }
        } else {
            self.record_defeat(key, &session, now);
            if key.kind == BattleKind::Pve {
                self.push_dungeon(
                    key,
                    &data,
                    DungeonEventType::Defeat,
                    format!("{} falls to {}", session.player.name, session.opponent.name),
                    damage,
                    Vec::new(),
                );
            }
        }
        tracing::info!(
            session = %key.cache_key(),
            round = session.round,
            victory,
            "battle ended"
        );
        Ok(data)
    }

    /// Drop the session. Returns whether one existed.
    pub fn end(&self, key: &SessionKey) -> Result<bool, GameError> {
        let existed = self.cache.del(&key.cache_key())?;
        self.cache.del(&key.last_round_key())?;
        Ok(existed)
    }

    pub fn session(&self, key: &SessionKey) -> Result<Option<BattleSession>, GameError> {
        Ok(self.cache.get_json(&key.cache_key())?)
    }

    fn load(&self, key: &SessionKey) -> Result<BattleSession, GameError> {
        self.session(key)?
            .ok_or_else(|| GameError::NotFound(format!("session {}", key.cache_key())))
    }

    fn ensure_idle(&self, key: &SessionKey) -> Result<(), GameError> {
        if self.cache.exists(&key.cache_key())? {
            return Err(GameError::AlreadyActive(key.cache_key()));
        }
        Ok(())
    }

    fn check_daily_limit(&self, player_id: PlayerId, kind: BattleKind, limit: u32) -> Result<(), GameError> {
        let since = day_start_millis(self.clock.now_millis());
        let count = with_db(&self.db, |db| db.battle_record().count_since(player_id, kind, since))?;
        if count >= limit {
            return Err(GameError::RateLimited { limit });
        }
        Ok(())
    }

    /// Claim the session key, then charge spirit. The claim is released if the
    /// charge fails.
    fn open(&self, key: &SessionKey, session: BattleSession, spirit_cost: f64) -> Result<RoundData, GameError> {
        let cache_key = key.cache_key();
        let json = serde_json::to_string(&session)?;
        if !self.cache.setnx_ex(&cache_key, json, self.config.session_ttl)? {
            return Err(GameError::AlreadyActive(cache_key));
        }
        if spirit_cost > 0.0 {
            if let Err(e) = with_db(&self.db, |db| db.player().spend_spirit(key.player_id, spirit_cost)) {
                if let Err(del) = self.cache.del(&cache_key) {
                    tracing::warn!(session = %cache_key, "failed to release unpaid session: {}", del);
                }
                return Err(e);
            }
        }
        tracing::info!(session = %cache_key, opponent = %session.opponent.name, "battle started");
        let line = format!("{} faces {}", session.player.name, session.opponent.name);
        Ok(RoundData::from_session(key, &session, vec![line]))
    }

    async fn pace(&self, key: &SessionKey) -> Result<(), GameError> {
        let last = self
            .cache
            .get(&key.last_round_key())?
            .and_then(|v| v.parse::<i64>().ok());
        if let Some(last) = last {
            let gap = self.config.min_round_interval.as_millis() as i64;
            let elapsed = self.clock.now_millis() - last;
            if elapsed < gap {
                tokio::time::sleep(Duration::from_millis((gap - elapsed) as u64)).await;
            }
        }
        Ok(())
    }

    /// Credit a victory. Storage failures are logged and swallowed: the
    /// session is already terminal, so nothing will retry the grant.
    fn grant(&self, key: &SessionKey, session: &BattleSession, now: i64) -> VictoryRewards {
        let level = session.player.level;
        let rewards = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            match key.kind {
                BattleKind::Pvp => roll_pvp(&self.catalog, level, session.round, &mut *rng),
                BattleKind::Pve => match self.catalog.monster(key.opponent_id) {
                    Some(monster) => roll_pve(&self.catalog, monster, level, session.round, &mut *rng),
                    None => roll_pvp(&self.catalog, level, session.round, &mut *rng),
                },
            }
        };

        let grant = VictoryGrant {
            player_id: key.player_id,
            spirit_stones: rewards.spirit_stones,
            cultivation: rewards.cultivation,
            loot: rewards.loot.clone(),
            record: battle_record(key, session, BattleResult::Win, rewards.describe(), now),
        };
        match with_db(&self.db, |db| db.grant_victory(&grant)) {
            Ok(outcome) => tracing::info!(
                player_id = key.player_id,
                record_id = outcome.record_id,
                spirit_stones = outcome.spirit_stones,
                cultivation = outcome.cultivation,
                luck = rewards.luck,
                "victory rewards granted"
            ),
            Err(e) => tracing::error!(
                player_id = key.player_id,
                session = %key.cache_key(),
                "reward grant failed, session closed without retry: {}",
                e
            ),
        }
        rewards
    }

    fn record_defeat(&self, key: &SessionKey, session: &BattleSession, now: i64) {
        let record = battle_record(key, session, BattleResult::Loss, "{}".to_string(), now);
        if let Err(e) = with_db(&self.db, |db| db.record_defeat(&record)) {
            tracing::error!(player_id = key.player_id, "failed to record defeat: {}", e);
        }
    }

    fn push_dungeon(
        &self,
        key: &SessionKey,
        data: &RoundData,
        event_type: DungeonEventType,
        message: String,
        (dealt, taken): (f64, f64),
        loot: Vec<String>,
    ) {
        let now = self.clock.now_millis();
        let event = DungeonEvent {
            user_id: key.player_id,
            event_type,
            dungeon: data.opponent_name.clone(),
            message,
            round_num: data.round,
            player_hp: data.player_hp,
            enemy_hp: data.opponent_hp,
            damage_dealt: round1(dealt),
            damage_taken: round1(taken),
            loot,
            timestamp: now,
        };
        self.hub
            .send(key.player_id, PushMessage::new(key.player_id, now, PushEvent::Dungeon(event)));
    }
}

fn combatant(record: &PlayerRecord) -> Result<Combatant, GameError> {
    let bundle = CombatBundle::from_value(&record.combat_attributes)?;
    Ok(Combatant::new(record.id, record.username.clone(), record.level, bundle))
}

fn battle_record(
    key: &SessionKey,
    session: &BattleSession,
    result: BattleResult,
    rewards: String,
    now: i64,
) -> NewBattleRecord {
    NewBattleRecord {
        player_id: key.player_id,
        opponent_id: key.opponent_id,
        opponent_name: session.opponent.name.clone(),
        result,
        kind: key.kind,
        rewards,
        created_at: now,
    }
}
