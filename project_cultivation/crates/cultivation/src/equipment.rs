//! Equipment operations. Enhance and reforge spend cached stones under an
//! operation lock; every change to a worn item recomputes the owner's
//! combat bundle.

use player_db::{EquipmentRecord, PlayerDb, PlayerDbError};
use presence::PlayerId;
use rand::Rng;
use serde::Serialize;

use crate::attributes::CombatBundle;
use crate::db::with_db;
use crate::error::GameError;
use crate::resources::{EquipmentResources, OperationLock, ResourceField};
use crate::service::GameServices;
use crate::stats::{equipment_bonus, refresh_combat_bundle};

/// Stat multiplier on a successful enhance.
pub const ENHANCE_GROWTH: f64 = 1.1;
pub const REFORGE_MIN: f64 = 0.8;
pub const REFORGE_MAX: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentView {
    pub id: i64,
    pub name: String,
    pub slot: String,
    pub quality: String,
    pub level: u32,
    pub stats: CombatBundle,
    pub equipped: bool,
}

impl TryFrom<&EquipmentRecord> for EquipmentView {
    type Error = PlayerDbError;

    fn try_from(item: &EquipmentRecord) -> Result<Self, PlayerDbError> {
        Ok(Self {
            id: item.id,
            name: item.name.clone(),
            slot: item.slot.clone(),
            quality: item.quality.clone(),
            level: item.level,
            stats: equipment_bonus(item)?,
            equipped: item.equipped,
        })
    }
}

/// Result of an enhance or reforge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeOutcome {
    pub success: bool,
    pub cost: i64,
    pub remaining: i64,
    pub equipment: EquipmentView,
}

fn owned(db: &PlayerDb, player_id: PlayerId, equipment_id: i64) -> Result<EquipmentRecord, PlayerDbError> {
    let item = db.equipment().load(equipment_id)?;
    if item.player_id != player_id {
        return Err(PlayerDbError::EquipmentNotFound(equipment_id));
    }
    Ok(item)
}

/// Persist new stats and refresh the owner's bundle if the item is worn.
fn store_item(db: &PlayerDb, item: &EquipmentRecord) -> Result<(), PlayerDbError> {
    db.equipment().update(item.id, item.level, &item.stats)?;
    if item.equipped {
        refresh_combat_bundle(db, item.player_id)?;
    }
    Ok(())
}

impl GameServices {
    pub fn list_equipment(&self, player_id: PlayerId) -> Result<Vec<EquipmentView>, GameError> {
        let items = with_db(&self.db, |db| db.equipment().list_for_player(player_id))?;
        let views = items.iter().map(EquipmentView::try_from).collect::<Result<_, _>>()?;
        Ok(views)
    }

    pub fn enhance(&self, player_id: PlayerId, equipment_id: i64) -> Result<ForgeOutcome, GameError> {
        self.enhance_with(player_id, equipment_id, &mut rand::rng())
    }

    pub fn enhance_with<R: Rng + ?Sized>(
        &self,
        player_id: PlayerId,
        equipment_id: i64,
        rng: &mut R,
    ) -> Result<ForgeOutcome, GameError> {
        let _lock = OperationLock::acquire(&self.cache, "equip", player_id, equipment_id, "enhance", self.lock_ttl)?;
        let mut item = with_db(&self.db, |db| owned(db, player_id, equipment_id))?;
        let mut stats = equipment_bonus(&item)?;

        let cost = self.catalog.enhance_cost(item.level);
        let remaining =
            self.resources
                .decrement::<EquipmentResources>(player_id, ResourceField::ReinforceStones, cost)?;

        let success = rng.random::<f64>() < self.catalog.enhance_success_rate(item.level);
        if success {
            stats.scale(ENHANCE_GROWTH);
            item.stats = stats.to_value();
            item.level += 1;
            with_db(&self.db, |db| store_item(db, &item))?;
        }
        tracing::info!(player_id, equipment_id, success, level = item.level, cost, "equipment enhanced");

        Ok(ForgeOutcome {
            success,
            cost,
            remaining,
            equipment: EquipmentView::try_from(&item)?,
        })
    }

    pub fn reforge(&self, player_id: PlayerId, equipment_id: i64) -> Result<ForgeOutcome, GameError> {
        self.reforge_with(player_id, equipment_id, &mut rand::rng())
    }

    pub fn reforge_with<R: Rng + ?Sized>(
        &self,
        player_id: PlayerId,
        equipment_id: i64,
        rng: &mut R,
    ) -> Result<ForgeOutcome, GameError> {
        let _lock = OperationLock::acquire(&self.cache, "equip", player_id, equipment_id, "reforge", self.lock_ttl)?;
        let mut item = with_db(&self.db, |db| owned(db, player_id, equipment_id))?;
        let mut stats = equipment_bonus(&item)?;

        let cost = self.catalog.policy.reforge_cost;
        let remaining =
            self.resources
                .decrement::<EquipmentResources>(player_id, ResourceField::RefinementStones, cost)?;

        stats.for_each_mut(|v| *v *= rng.random_range(REFORGE_MIN..=REFORGE_MAX));
        item.stats = stats.to_value();
        with_db(&self.db, |db| store_item(db, &item))?;
        tracing::info!(player_id, equipment_id, cost, "equipment reforged");

        Ok(ForgeOutcome {
            success: true,
            cost,
            remaining,
            equipment: EquipmentView::try_from(&item)?,
        })
    }

    /// Wear an item, displacing whatever held the slot. Returns the new bundle.
    pub fn equip(&self, player_id: PlayerId, equipment_id: i64) -> Result<CombatBundle, GameError> {
        self.set_worn(player_id, equipment_id, true)
    }

    pub fn unequip(&self, player_id: PlayerId, equipment_id: i64) -> Result<CombatBundle, GameError> {
        self.set_worn(player_id, equipment_id, false)
    }

    fn set_worn(&self, player_id: PlayerId, equipment_id: i64, worn: bool) -> Result<CombatBundle, GameError> {
        with_db(&self.db, |db| {
            owned(db, player_id, equipment_id)?;
            db.equipment().set_equipped(equipment_id, worn)?;
            refresh_combat_bundle(db, player_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::testutil::{register_player, TestWorld};
    use player_db::NewEquipment;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sword(world: &TestWorld, player_id: PlayerId, attack: f64) -> i64 {
        let mut stats = CombatBundle::default();
        stats.base.attack = attack;
        stats.rates.crit_rate = 0.1;
        let item = NewEquipment {
            player_id,
            name: "Iron Sword".into(),
            slot: "weapon".into(),
            quality: "common".into(),
            stats: stats.to_value(),
        };
        with_db(&world.db, |db| db.equipment().create(&item)).unwrap().id
    }

    fn combat(world: &TestWorld, player_id: PlayerId) -> CombatBundle {
        world.player(player_id).unwrap().combat
    }

    #[test]
    fn equip_and_unequip_recompute_from_scratch() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Knight", &world.catalog);
        let eid = sword(&world, pid, 15.0);

        for _ in 0..3 {
            let bundle = world.equip(pid, eid).unwrap();
            assert_eq!(bundle.base.attack, 35.0);
            assert_eq!(combat(&world, pid).rates.crit_rate, 0.1);
            let bundle = world.unequip(pid, eid).unwrap();
            assert_eq!(bundle.base.attack, 20.0);
        }
        assert_eq!(combat(&world, pid).base.attack, 20.0);
    }

    #[test]
    fn enhance_spends_stones_and_grows_stats() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Smith", &world.catalog);
        let eid = sword(&world, pid, 10.0);
        world.equip(pid, eid).unwrap();
        world.resources.hydrate_all(pid).unwrap();

        // Level 0 always succeeds.
        let outcome = world.enhance(pid, eid).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.cost, 10);
        assert_eq!(outcome.remaining, 990);
        assert_eq!(outcome.equipment.level, 1);
        assert!((outcome.equipment.stats.base.attack - 11.0).abs() < 1e-9);
        assert!((combat(&world, pid).base.attack - 31.0).abs() < 1e-9);

        let outcome = world.enhance(pid, eid).unwrap();
        assert_eq!(outcome.cost, 20);
        assert_eq!(outcome.remaining, 970);
    }

    #[test]
    fn failed_enhance_still_costs() {
        let mut catalog = Catalog::default();
        catalog.policy.enhance_success = vec![0.0];
        let world = TestWorld::with_catalog(catalog);
        let pid = register_player(&world, "Unlucky", &world.catalog);
        let eid = sword(&world, pid, 10.0);
        world.resources.hydrate_all(pid).unwrap();

        let outcome = world.enhance(pid, eid).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.remaining, 990);
        assert_eq!(outcome.equipment.level, 0);
        assert_eq!(outcome.equipment.stats.base.attack, 10.0);
    }

    #[test]
    fn enhance_after_cache_expiry_reloads_stones() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Cold", &world.catalog);
        let eid = sword(&world, pid, 10.0);
        world.resources.hydrate_all(pid).unwrap();
        world.clock.advance(std::time::Duration::from_secs(25));

        let outcome = world.enhance(pid, eid).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.remaining, 990);
        // The lock was released once the operation finished.
        assert!(!world.cache.exists(&format!("lock:equip:{pid}:{eid}:enhance")).unwrap());
    }

    #[test]
    fn short_balance_is_insufficient_resource() {
        let mut catalog = Catalog::default();
        catalog.policy.enhance_cost_base = 5_000;
        let world = TestWorld::with_catalog(catalog);
        let pid = register_player(&world, "Broke", &world.catalog);
        let eid = sword(&world, pid, 10.0);
        world.resources.hydrate_all(pid).unwrap();
        assert!(matches!(
            world.enhance(pid, eid),
            Err(GameError::InsufficientResource { resource: "reinforceStones", .. })
        ));
    }

    #[test]
    fn concurrent_enhance_is_lock_busy() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Eager", &world.catalog);
        let eid = sword(&world, pid, 10.0);
        world.resources.hydrate_all(pid).unwrap();

        let held =
            OperationLock::acquire(&world.cache, "equip", pid, eid, "enhance", world.lock_ttl).unwrap();
        assert!(matches!(world.enhance(pid, eid), Err(GameError::LockBusy(_))));
        // A different operation on the same item is not blocked.
        assert!(world.reforge(pid, eid).is_ok());
        drop(held);
        assert!(world.enhance(pid, eid).is_ok());
    }

    #[test]
    fn reforge_rerolls_within_bounds() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Tinker", &world.catalog);
        let eid = sword(&world, pid, 100.0);
        world.resources.hydrate_all(pid).unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        let outcome = world.reforge_with(pid, eid, &mut rng).unwrap();
        let attack = outcome.equipment.stats.base.attack;
        assert!((80.0..=120.0).contains(&attack), "attack {attack}");
        assert_eq!(outcome.remaining, 90);
        assert_eq!(outcome.equipment.stats.base.health, 0.0);
    }

    #[test]
    fn foreign_items_are_not_found() {
        let world = TestWorld::new();
        let owner = register_player(&world, "Owner", &world.catalog);
        let thief = register_player(&world, "Thief", &world.catalog);
        let eid = sword(&world, owner, 10.0);
        world.resources.hydrate_all(thief).unwrap();
        assert!(matches!(world.equip(thief, eid), Err(GameError::NotFound(_))));
        assert!(matches!(world.enhance(thief, eid), Err(GameError::NotFound(_))));
    }

    #[test]
    fn corrupt_stats_fail_without_spending() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Rusty", &world.catalog);
        let item = NewEquipment {
            player_id: pid,
            name: "Cracked Blade".into(),
            slot: "weapon".into(),
            quality: "common".into(),
            stats: serde_json::json!({"base": {"attack": "sharp"}}),
        };
        let eid = with_db(&world.db, |db| db.equipment().create(&item)).unwrap().id;
        world.resources.hydrate_all(pid).unwrap();

        assert!(matches!(world.reforge(pid, eid), Err(GameError::TransientStorage(_))));
        assert!(matches!(world.enhance(pid, eid), Err(GameError::TransientStorage(_))));
        assert!(world.list_equipment(pid).is_err());
        let left = world.resources.get::<EquipmentResources>(pid).unwrap();
        assert_eq!(left.refinement_stones, 100);
        assert_eq!(left.reinforce_stones, 1000);
    }
}
