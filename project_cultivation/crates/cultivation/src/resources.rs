//! Write-back cache for mutable resource counters.
//!
//! Mutations hit the cache; the durable store catches up on flush (periodic
//! sync, logout, heartbeat timeout). The cache TTL must outlive the presence
//! heartbeat timeout so cleanup can flush before an entry expires.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cache::CacheStore;
use engine_core::{JobOutcome, TickJob};
use player_db::{PlayerDb, PlayerDbError};
use presence::PlayerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::{with_db, SharedDb};
use crate::error::GameError;
use crate::keys::{last_op_key, lock_key, parse_resource_key, resource_key};

/// A counter that can be decremented in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceField {
    ReinforceStones,
    RefinementStones,
    PetEssence,
}

impl ResourceField {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceField::ReinforceStones => "reinforceStones",
            ResourceField::RefinementStones => "refinementStones",
            ResourceField::PetEssence => "petEssence",
        }
    }
}

/// One cached group of counters, flushed in a single update.
pub trait ResourceFamily: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    const NAME: &'static str;

    fn load(db: &PlayerDb, player_id: PlayerId) -> Result<Self, PlayerDbError>;
    fn store(&self, db: &PlayerDb, player_id: PlayerId) -> Result<(), PlayerDbError>;
    fn field_mut(&mut self, field: ResourceField) -> Option<&mut i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentResources {
    pub reinforce_stones: i64,
    pub refinement_stones: i64,
}

impl ResourceFamily for EquipmentResources {
    const NAME: &'static str = "equip";

    fn load(db: &PlayerDb, player_id: PlayerId) -> Result<Self, PlayerDbError> {
        let (reinforce_stones, refinement_stones) = db.player().equipment_resources(player_id)?;
        Ok(Self {
            reinforce_stones,
            refinement_stones,
        })
    }

    fn store(&self, db: &PlayerDb, player_id: PlayerId) -> Result<(), PlayerDbError> {
        db.player()
            .set_equipment_resources(player_id, self.reinforce_stones, self.refinement_stones)
    }

    fn field_mut(&mut self, field: ResourceField) -> Option<&mut i64> {
        match field {
            ResourceField::ReinforceStones => Some(&mut self.reinforce_stones),
            ResourceField::RefinementStones => Some(&mut self.refinement_stones),
            ResourceField::PetEssence => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetResources {
    pub pet_essence: i64,
}

impl ResourceFamily for PetResources {
    const NAME: &'static str = "pet";

    fn load(db: &PlayerDb, player_id: PlayerId) -> Result<Self, PlayerDbError> {
        Ok(Self {
            pet_essence: db.player().pet_essence(player_id)?,
        })
    }

    fn store(&self, db: &PlayerDb, player_id: PlayerId) -> Result<(), PlayerDbError> {
        db.player().set_pet_essence(player_id, self.pet_essence)
    }

    fn field_mut(&mut self, field: ResourceField) -> Option<&mut i64> {
        match field {
            ResourceField::PetEssence => Some(&mut self.pet_essence),
            _ => None,
        }
    }
}

pub struct ResourceCache {
    cache: Arc<CacheStore>,
    db: SharedDb,
    ttl: Duration,
    /// Serializes read-modify-write on counters.
    write_guard: Mutex<()>,
}

impl ResourceCache {
    pub fn new(cache: Arc<CacheStore>, db: SharedDb, ttl: Duration) -> Self {
        Self {
            cache,
            db,
            ttl,
            write_guard: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load from the durable store into the cache.
    pub fn hydrate<F: ResourceFamily>(&self, player_id: PlayerId) -> Result<F, GameError> {
        let value = with_db(&self.db, |db| F::load(db, player_id))?;
        self.cache.set_json_ex(&resource_key(F::NAME, player_id), &value, self.ttl)?;
        tracing::debug!(player_id, family = F::NAME, "resources hydrated");
        Ok(value)
    }

    pub fn hydrate_all(&self, player_id: PlayerId) -> Result<(), GameError> {
        self.hydrate::<EquipmentResources>(player_id)?;
        self.hydrate::<PetResources>(player_id)?;
        Ok(())
    }

    /// Cache-only read.
    pub fn get<F: ResourceFamily>(&self, player_id: PlayerId) -> Result<F, GameError> {
        self.cache
            .get_json(&resource_key(F::NAME, player_id))?
            .ok_or(GameError::NotCached {
                player_id,
                family: F::NAME,
            })
    }

    /// Push back the expiry of both families. Entries that are already gone
    /// stay gone; the next mutation re-hydrates them.
    pub fn touch(&self, player_id: PlayerId) -> Result<(), GameError> {
        for family in [EquipmentResources::NAME, PetResources::NAME] {
            self.cache.expire(&resource_key(family, player_id), self.ttl)?;
        }
        Ok(())
    }

    /// Subtract `amount` from one counter, re-hydrating from the durable store
    /// on a miss. A short balance leaves everything untouched. Returns the
    /// remaining balance.
    pub fn decrement<F: ResourceFamily>(
        &self,
        player_id: PlayerId,
        field: ResourceField,
        amount: i64,
    ) -> Result<i64, GameError> {
        if amount < 0 {
            return Err(GameError::InvalidRequest("negative amount".into()));
        }
        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| GameError::TransientStorage("resource guard poisoned".into()))?;

        let mut value: F = match self.cache.get_json(&resource_key(F::NAME, player_id))? {
            Some(value) => value,
            None => self.hydrate(player_id)?,
        };
        let counter = value
            .field_mut(field)
            .ok_or_else(|| GameError::InvalidRequest(format!("{} is not a {} resource", field.as_str(), F::NAME)))?;
        if *counter < amount {
            return Err(GameError::InsufficientResource {
                resource: field.as_str(),
                needed: amount,
                available: *counter,
            });
        }
        *counter -= amount;
        let remaining = *counter;

        self.cache.set_json_ex(&resource_key(F::NAME, player_id), &value, self.ttl)?;
        self.cache
            .set_ex(&last_op_key(F::NAME, player_id), self.cache.now_millis().to_string(), self.ttl)?;
        Ok(remaining)
    }

    /// Write the cached value back. No-op (false) on a miss.
    pub fn flush<F: ResourceFamily>(&self, player_id: PlayerId) -> Result<bool, GameError> {
        let Some(value) = self.cache.get_json::<F>(&resource_key(F::NAME, player_id))? else {
            return Ok(false);
        };
        with_db(&self.db, |db| value.store(db, player_id))?;
        tracing::debug!(player_id, family = F::NAME, ?value, "resources flushed");
        Ok(true)
    }

    /// Flush then drop the cache entry. The entry survives a failed flush.
    pub fn flush_and_evict<F: ResourceFamily>(&self, player_id: PlayerId) -> Result<bool, GameError> {
        let flushed = self.flush::<F>(player_id)?;
        self.cache.del(&resource_key(F::NAME, player_id))?;
        Ok(flushed)
    }

    /// Players with a live cache entry for `F`.
    pub fn cached_players<F: ResourceFamily>(&self) -> Result<Vec<PlayerId>, GameError> {
        let pattern = format!("res:{}:*", F::NAME);
        Ok(self
            .cache
            .scan(&pattern)?
            .iter()
            .filter_map(|key| parse_resource_key(key))
            .collect())
    }

    /// Flush every cached entry of both families. Returns (flushed, failed).
    pub fn sync_all(&self) -> (usize, usize) {
        let mut outcome = (0, 0);
        self.sync_family::<EquipmentResources>(&mut outcome);
        self.sync_family::<PetResources>(&mut outcome);
        outcome
    }

    fn sync_family<F: ResourceFamily>(&self, outcome: &mut (usize, usize)) {
        let players = match self.cached_players::<F>() {
            Ok(players) => players,
            Err(e) => {
                tracing::warn!(family = F::NAME, "resource sync scan failed: {}", e);
                outcome.1 += 1;
                return;
            }
        };
        for player_id in players {
            match self.flush::<F>(player_id) {
                Ok(_) => outcome.0 += 1,
                Err(e) => {
                    tracing::warn!(player_id, family = F::NAME, "resource sync flush failed: {}", e);
                    outcome.1 += 1;
                }
            }
        }
    }
}

/// Short-lived `SETNX` lock serializing one client's concurrent attempts at
/// the same operation. Released on drop; the TTL covers a crashed holder.
#[derive(Debug)]
pub struct OperationLock {
    cache: Arc<CacheStore>,
    key: String,
}

impl OperationLock {
    pub fn acquire(
        cache: &Arc<CacheStore>,
        scope: &str,
        player_id: PlayerId,
        entity_id: i64,
        op: &str,
        ttl: Duration,
    ) -> Result<Self, GameError> {
        let key = lock_key(scope, player_id, entity_id, op);
        if cache.setnx_ex(&key, cache.now_millis().to_string(), ttl)? {
            Ok(Self {
                cache: cache.clone(),
                key,
            })
        } else {
            Err(GameError::LockBusy(key))
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = self.cache.del(&self.key) {
            tracing::warn!(key = %self.key, "failed to release operation lock: {}", e);
        }
    }
}

/// Periodic bulk flush of every cached resource entry.
pub struct ResourceSyncJob {
    resources: Arc<ResourceCache>,
}

impl ResourceSyncJob {
    pub fn new(resources: Arc<ResourceCache>) -> Self {
        Self { resources }
    }
}

impl TickJob for ResourceSyncJob {
    fn name(&self) -> &'static str {
        "resource-sync"
    }

    fn run_tick(&mut self, _tick: u64) -> JobOutcome {
        let (processed, failed) = self.resources.sync_all();
        JobOutcome { processed, failed }
    }
}
