//! Pet operations. Upgrade and evolve spend cached essence under an
//! operation lock; a deployed pet's bonuses feed the owner's bundle.

use player_db::{PetRecord, PlayerDb, PlayerDbError};
use presence::PlayerId;
use serde::Serialize;

use crate::attributes::CombatBundle;
use crate::catalog::Catalog;
use crate::db::with_db;
use crate::error::GameError;
use crate::resources::{OperationLock, PetResources, ResourceField};
use crate::service::GameServices;
use crate::stats::refresh_combat_bundle;

/// Added to every bonus per level gained.
pub const LEVEL_BONUS_STEP: f64 = 0.01;
/// Every bonus is multiplied by this per star gained.
pub const STAR_BONUS_GROWTH: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetView {
    pub id: i64,
    pub name: String,
    pub rarity: u32,
    pub level: u32,
    pub star: u32,
    pub attack_bonus: f64,
    pub defense_bonus: f64,
    pub health_bonus: f64,
    pub deployed: bool,
}

impl From<&PetRecord> for PetView {
    fn from(pet: &PetRecord) -> Self {
        Self {
            id: pet.id,
            name: pet.name.clone(),
            rarity: pet.rarity,
            level: pet.level,
            star: pet.star,
            attack_bonus: pet.attack_bonus,
            defense_bonus: pet.defense_bonus,
            health_bonus: pet.health_bonus,
            deployed: pet.deployed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetOutcome {
    pub cost: i64,
    pub remaining: i64,
    pub pet: PetView,
}

fn owned(db: &PlayerDb, player_id: PlayerId, pet_id: i64) -> Result<PetRecord, PlayerDbError> {
    let pet = db.pet().load(pet_id)?;
    if pet.player_id != player_id {
        return Err(PlayerDbError::PetNotFound(pet_id));
    }
    Ok(pet)
}

#[derive(Debug, Clone, Copy)]
enum Growth {
    Upgrade,
    Evolve,
}

impl Growth {
    fn as_str(self) -> &'static str {
        match self {
            Growth::Upgrade => "upgrade",
            Growth::Evolve => "evolve",
        }
    }

    fn cost(self, catalog: &Catalog, pet: &PetRecord) -> i64 {
        match self {
            Growth::Upgrade => catalog.pet_upgrade_cost(pet.level),
            Growth::Evolve => catalog.pet_evolve_cost(pet.star),
        }
    }

    fn apply(self, pet: &mut PetRecord) {
        let bonuses = [&mut pet.attack_bonus, &mut pet.defense_bonus, &mut pet.health_bonus];
        match self {
            Growth::Upgrade => {
                pet.level += 1;
                bonuses.into_iter().for_each(|b| *b += LEVEL_BONUS_STEP);
            }
            Growth::Evolve => {
                pet.star += 1;
                bonuses.into_iter().for_each(|b| *b *= STAR_BONUS_GROWTH);
            }
        }
    }
}

fn store_pet(db: &PlayerDb, pet: &PetRecord) -> Result<(), PlayerDbError> {
    db.pet().update(pet)?;
    if pet.deployed {
        refresh_combat_bundle(db, pet.player_id)?;
    }
    Ok(())
}

impl GameServices {
    pub fn list_pets(&self, player_id: PlayerId) -> Result<Vec<PetView>, GameError> {
        let pets = with_db(&self.db, |db| db.pet().list_for_player(player_id))?;
        Ok(pets.iter().map(PetView::from).collect())
    }

    pub fn upgrade_pet(&self, player_id: PlayerId, pet_id: i64) -> Result<PetOutcome, GameError> {
        self.grow_pet(player_id, pet_id, Growth::Upgrade)
    }

    pub fn evolve_pet(&self, player_id: PlayerId, pet_id: i64) -> Result<PetOutcome, GameError> {
        self.grow_pet(player_id, pet_id, Growth::Evolve)
    }

    fn grow_pet(&self, player_id: PlayerId, pet_id: i64, growth: Growth) -> Result<PetOutcome, GameError> {
        let op = growth.as_str();
        let _lock = OperationLock::acquire(&self.cache, "pet", player_id, pet_id, op, self.lock_ttl)?;
        let mut pet = with_db(&self.db, |db| owned(db, player_id, pet_id))?;

        let cost = growth.cost(&self.catalog, &pet);
        let remaining = self
            .resources
            .decrement::<PetResources>(player_id, ResourceField::PetEssence, cost)?;
        growth.apply(&mut pet);
        with_db(&self.db, |db| store_pet(db, &pet))?;
        tracing::info!(player_id, pet_id, op, level = pet.level, star = pet.star, cost, "pet grown");

        Ok(PetOutcome {
            cost,
            remaining,
            pet: PetView::from(&pet),
        })
    }

    /// Send a pet out, recalling any other. Returns the new bundle.
    pub fn deploy_pet(&self, player_id: PlayerId, pet_id: i64) -> Result<CombatBundle, GameError> {
        self.set_deployed(player_id, pet_id, true)
    }

    pub fn recall_pet(&self, player_id: PlayerId, pet_id: i64) -> Result<CombatBundle, GameError> {
        self.set_deployed(player_id, pet_id, false)
    }

    fn set_deployed(&self, player_id: PlayerId, pet_id: i64, deployed: bool) -> Result<CombatBundle, GameError> {
        with_db(&self.db, |db| {
            owned(db, player_id, pet_id)?;
            db.pet().set_deployed(pet_id, deployed)?;
            refresh_combat_bundle(db, player_id)
        })
    }
}
