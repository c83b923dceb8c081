use player_db::{EquipmentRecord, PetRecord, PlayerDb, PlayerDbError};
use presence::PlayerId;

use crate::attributes::CombatBundle;

/// Percentage bonuses a deployed pet grants to the base group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PetBonus {
    pub attack: f64,
    pub defense: f64,
    pub health: f64,
}

impl From<&PetRecord> for PetBonus {
    fn from(pet: &PetRecord) -> Self {
        Self {
            attack: pet.attack_bonus,
            defense: pet.defense_bonus,
            health: pet.health_bonus,
        }
    }
}

/// Final bundle from scratch: intrinsic base, plus equipment flats, then pet
/// percentages on the base group, then clamping.
pub fn recompute_bundle(base: &CombatBundle, equipped: &[CombatBundle], pet: Option<PetBonus>) -> CombatBundle {
    let mut bundle = *base;
    for item in equipped {
        bundle.add(item);
    }
    if let Some(pet) = pet {
        bundle.base.attack *= 1.0 + pet.attack;
        bundle.base.defense *= 1.0 + pet.defense;
        bundle.base.health *= 1.0 + pet.health;
    }
    bundle.clamp();
    bundle
}

/// A stored bundle that no longer parses is an error, never zero stats.
fn decode(value: &serde_json::Value) -> Result<CombatBundle, PlayerDbError> {
    Ok(serde_json::from_value(value.clone())?)
}

pub fn equipment_bonus(item: &EquipmentRecord) -> Result<CombatBundle, PlayerDbError> {
    decode(&item.stats).inspect_err(|e| {
        tracing::warn!(equipment_id = item.id, player_id = item.player_id, "corrupt equipment stats: {}", e)
    })
}

/// Recompute a player's combat bundle from the database and persist it.
pub fn refresh_combat_bundle(db: &PlayerDb, player_id: PlayerId) -> Result<CombatBundle, PlayerDbError> {
    let player = db.player().load(player_id)?;
    let equipped: Vec<CombatBundle> = db
        .equipment()
        .list_equipped(player_id)?
        .iter()
        .map(equipment_bonus)
        .collect::<Result<_, _>>()?;
    let pet = db.pet().deployed(player_id)?.as_ref().map(PetBonus::from);

    let base = decode(&player.base_attributes)
        .inspect_err(|e| tracing::warn!(player_id, "corrupt base attributes: {}", e))?;
    let bundle = recompute_bundle(&base, &equipped, pet);
    db.player().set_combat_attributes(player_id, &bundle.to_value())?;
    tracing::debug!(player_id, items = equipped.len(), pet = pet.is_some(), "combat bundle recomputed");
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CombatBundle {
        let mut b = CombatBundle::default();
        b.base.attack = 100.0;
        b.base.health = 1000.0;
        b.base.defense = 10.0;
        b.rates.crit_rate = 0.5;
        b
    }

    #[test]
    fn flats_then_pet_percentage() {
        let mut sword = CombatBundle::default();
        sword.base.attack = 20.0;
        sword.rates.crit_rate = 0.7;

        let pet = PetBonus {
            attack: 0.1,
            defense: 0.0,
            health: 0.5,
        };
        let bundle = recompute_bundle(&base(), &[sword], Some(pet));
        assert!((bundle.base.attack - 132.0).abs() < 1e-9);
        assert_eq!(bundle.base.health, 1500.0);
        assert_eq!(bundle.base.defense, 10.0);
        assert_eq!(bundle.rates.crit_rate, 1.0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut ring = CombatBundle::default();
        ring.base.defense = 5.0;
        let once = recompute_bundle(&base(), &[ring], None);
        let twice = recompute_bundle(&base(), &[ring], None);
        assert_eq!(once, twice);
        // Unequipping is just recomputing without the item.
        assert_eq!(recompute_bundle(&base(), &[], None).base.defense, 10.0);
    }
}
