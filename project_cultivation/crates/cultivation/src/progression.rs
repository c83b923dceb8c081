//! Cultivation and realm breakthroughs.

use presence::PlayerId;
use serde::Serialize;

use crate::db::with_db;
use crate::error::GameError;
use crate::round1;
use crate::service::GameServices;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CultivateOutcome {
    pub spirit: f64,
    pub cultivation: f64,
    pub max_cultivation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakthroughOutcome {
    pub level: u32,
    pub realm: String,
    pub max_cultivation: f64,
}

impl GameServices {
    /// Trade spirit for cultivation; the gain is capped at the realm maximum.
    pub fn cultivate(&self, player_id: PlayerId) -> Result<CultivateOutcome, GameError> {
        let policy = &self.catalog.policy;
        let (spirit, cultivation, max_cultivation) = with_db(&self.db, |db| {
            let spirit = db.player().spend_spirit(player_id, policy.cultivate_spirit_cost)?;
            let cultivation = db.player().add_cultivation(player_id, policy.cultivate_yield)?;
            let max = db.player().load(player_id)?.max_cultivation;
            Ok((spirit, cultivation, max))
        })?;
        tracing::debug!(player_id, cultivation, "cultivated");
        Ok(CultivateOutcome {
            spirit: round1(spirit),
            cultivation: round1(cultivation),
            max_cultivation,
        })
    }

    pub fn breakthrough(&self, player_id: PlayerId) -> Result<BreakthroughOutcome, GameError> {
        let player = with_db(&self.db, |db| db.player().load(player_id))?;
        if player.cultivation < player.max_cultivation {
            return Err(GameError::InvalidRequest(format!(
                "cultivation {} has not reached {}",
                round1(player.cultivation),
                player.max_cultivation
            )));
        }
        let next = self
            .catalog
            .next_realm(player.level)
            .ok_or_else(|| GameError::InvalidRequest("already at the highest realm".into()))?;

        with_db(&self.db, |db| {
            db.player()
                .breakthrough(player_id, next.level, &next.name, next.max_cultivation)
        })?;
        tracing::info!(player_id, level = next.level, realm = %next.name, "breakthrough");
        Ok(BreakthroughOutcome {
            level: next.level,
            realm: next.name.clone(),
            max_cultivation: next.max_cultivation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Realm};
    use crate::testutil::{register_player, TestWorld, T0};

    #[test]
    fn cultivate_spends_spirit_and_caps_cultivation() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Monk", &world.catalog);
        with_db(&world.db, |db| db.player().update_spirit(pid, 1_000.0, T0)).unwrap();

        let first = world.cultivate(pid).unwrap();
        assert_eq!(first.spirit, 990.0);
        assert_eq!(first.cultivation, 10.0);
        for _ in 0..20 {
            let outcome = world.cultivate(pid).unwrap();
            assert!(outcome.cultivation <= outcome.max_cultivation);
        }
        assert_eq!(world.player(pid).unwrap().cultivation, 100.0);
    }

    #[test]
    fn cultivate_without_spirit_fails() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Drained", &world.catalog);
        with_db(&world.db, |db| db.player().update_spirit(pid, 9.9, T0)).unwrap();
        assert!(matches!(
            world.cultivate(pid),
            Err(GameError::InsufficientSpirit { needed }) if needed == 10.0
        ));
        assert_eq!(world.player(pid).unwrap().cultivation, 0.0);
    }

    #[test]
    fn breakthrough_needs_full_cultivation() {
        let world = TestWorld::new();
        let pid = register_player(&world, "Climber", &world.catalog);
        assert!(matches!(world.breakthrough(pid), Err(GameError::InvalidRequest(_))));

        with_db(&world.db, |db| db.player().add_cultivation(pid, 100.0)).unwrap();
        let outcome = world.breakthrough(pid).unwrap();
        assert_eq!(outcome.level, 2);
        assert_eq!(outcome.realm, "Foundation Establishment");

        let view = world.player(pid).unwrap();
        assert_eq!(view.cultivation, 0.0);
        assert_eq!(view.max_cultivation, 300.0);
    }

    #[test]
    fn top_realm_cannot_break_through() {
        let mut catalog = Catalog::default();
        catalog.realms = vec![Realm {
            level: 1,
            name: "Only".into(),
            max_cultivation: 10.0,
        }];
        let world = TestWorld::with_catalog(catalog);
        let pid = register_player(&world, "Peak", &world.catalog);
        with_db(&world.db, |db| db.player().add_cultivation(pid, 10.0)).unwrap();
        assert!(matches!(world.breakthrough(pid), Err(GameError::InvalidRequest(_))));
    }
}
