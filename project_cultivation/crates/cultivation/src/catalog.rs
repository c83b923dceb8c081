//! Read-only reference data: realms, monsters, herbs, reward formulas and
//! policy constants. Loaded once at startup from TOML, or built in.

use std::path::Path;

use player_db::NewPlayer;
use serde::Deserialize;
use thiserror::Error;

use crate::attributes::CombatBundle;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Realm {
    pub level: u32,
    pub name: String,
    pub max_cultivation: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Monster {
    pub id: i64,
    pub name: String,
    pub level: u32,
    /// `stats.base.health` is the monster's max HP.
    pub stats: CombatBundle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HerbDef {
    pub id: String,
    pub name: String,
    pub rarity: String,
    /// Relative drop weight.
    pub weight: f64,
}

/// `floor(base × multiplier^(level−1))` plus a round bonus that shrinks
/// for long fights.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewardFormula {
    pub base: f64,
    pub multiplier: f64,
    pub round_bonus_coeff: f64,
    pub max_round_bonus: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LuckTier {
    pub threshold: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub spirit_stones: RewardFormula,
    pub cultivation: RewardFormula,
    /// Ascending thresholds; a draw takes the first tier at or above it.
    pub luck: Vec<LuckTier>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            spirit_stones: RewardFormula {
                base: 10.0,
                multiplier: 1.2,
                round_bonus_coeff: 5.0,
                max_round_bonus: 5.0,
            },
            cultivation: RewardFormula {
                base: 20.0,
                multiplier: 1.15,
                round_bonus_coeff: 5.0,
                max_round_bonus: 5.0,
            },
            luck: vec![
                LuckTier { threshold: 0.01, factor: 3.0 },
                LuckTier { threshold: 0.06, factor: 2.5 },
                LuckTier { threshold: 0.16, factor: 2.0 },
                LuckTier { threshold: 0.31, factor: 1.5 },
                LuckTier { threshold: 1.00, factor: 1.0 },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StarterValues {
    pub spirit: f64,
    pub spirit_rate: f64,
    pub spirit_stones: i64,
    pub reinforce_stones: i64,
    pub refinement_stones: i64,
    pub pet_essence: i64,
    pub attributes: CombatBundle,
}

impl Default for StarterValues {
    fn default() -> Self {
        let mut attributes = CombatBundle::default();
        attributes.base.attack = 20.0;
        attributes.base.health = 200.0;
        attributes.base.defense = 5.0;
        attributes.base.speed = 10.0;
        Self {
            spirit: 100.0,
            spirit_rate: 1.0,
            spirit_stones: 100,
            reinforce_stones: 1000,
            refinement_stones: 100,
            pet_essence: 500,
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub daily_duel_limit: u32,
    pub duel_spirit_cost: f64,
    pub daily_pve_limit: u32,
    pub pve_spirit_cost: f64,
    /// Monsters with `id >= exorcism_threshold` are exorcism targets.
    pub exorcism_threshold: i64,
    pub pill_fragment_chance: f64,
    pub pill_fragment_id: String,
    pub enhance_cost_base: i64,
    pub reforge_cost: i64,
    /// Success chance indexed by current level; the last entry covers the rest.
    pub enhance_success: Vec<f64>,
    pub pet_upgrade_cost_base: i64,
    pub pet_evolve_cost_base: i64,
    pub cultivate_spirit_cost: f64,
    pub cultivate_yield: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            daily_duel_limit: 10,
            duel_spirit_cost: 10.0,
            daily_pve_limit: 50,
            pve_spirit_cost: 5.0,
            exorcism_threshold: 1000,
            pill_fragment_chance: 0.3,
            pill_fragment_id: "foundation_pill".to_string(),
            enhance_cost_base: 10,
            reforge_cost: 10,
            enhance_success: vec![1.0, 0.95, 0.9, 0.85, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3],
            pet_upgrade_cost_base: 10,
            pet_evolve_cost_base: 100,
            cultivate_spirit_cost: 10.0,
            cultivate_yield: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub realms: Vec<Realm>,
    pub monsters: Vec<Monster>,
    pub herbs: Vec<HerbDef>,
    pub rewards: RewardConfig,
    pub policy: Policy,
    pub starter: StarterValues,
}

impl Default for Catalog {
    fn default() -> Self {
        let realms = [
            "Qi Refining",
            "Foundation Establishment",
            "Core Formation",
            "Nascent Soul",
            "Spirit Severing",
            "Void Refinement",
            "Body Integration",
            "Mahayana",
            "Tribulation",
        ]
        .iter()
        .zip([100.0, 300.0, 600.0, 1000.0, 1500.0, 2100.0, 2800.0, 3600.0, 4500.0])
        .enumerate()
        .map(|(i, (name, max))| Realm {
            level: i as u32 + 1,
            name: name.to_string(),
            max_cultivation: max,
        })
        .collect();

        let monsters = vec![
            monster(1, "Wild Boar", 1, 15.0, 120.0, 3.0, 8.0),
            monster(2, "Grey Wolf", 2, 25.0, 180.0, 5.0, 14.0),
            monster(3, "Stone Golem", 4, 40.0, 400.0, 20.0, 5.0),
            monster(1001, "Wandering Ghost", 3, 35.0, 250.0, 8.0, 12.0),
            monster(1002, "Blood Demon", 6, 70.0, 600.0, 25.0, 18.0),
        ];

        let herbs = vec![
            herb("spirit_grass", "Spirit Grass", "common", 60.0),
            herb("moonleaf", "Moonleaf", "uncommon", 25.0),
            herb("dragon_ginseng", "Dragon Ginseng", "rare", 12.0),
            herb("phoenix_lotus", "Phoenix Lotus", "legendary", 3.0),
        ];

        Self {
            realms,
            monsters,
            herbs,
            rewards: RewardConfig::default(),
            policy: Policy::default(),
            starter: StarterValues::default(),
        }
    }
}

fn monster(id: i64, name: &str, level: u32, attack: f64, health: f64, defense: f64, speed: f64) -> Monster {
    let mut stats = CombatBundle::default();
    stats.base.attack = attack;
    stats.base.health = health;
    stats.base.defense = defense;
    stats.base.speed = speed;
    Monster {
        id,
        name: name.to_string(),
        level,
        stats,
    }
}

fn herb(id: &str, name: &str, rarity: &str, weight: f64) -> HerbDef {
    HerbDef {
        id: id.to_string(),
        name: name.to_string(),
        rarity: rarity.to_string(),
        weight,
    }
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let mut catalog: Catalog = toml::from_str(text)?;
        catalog.normalize()?;
        Ok(catalog)
    }

    fn normalize(&mut self) -> Result<(), CatalogError> {
        if self.realms.is_empty() {
            return Err(CatalogError::Invalid("at least one realm is required".into()));
        }
        self.realms.sort_by_key(|r| r.level);
        if self.realms.windows(2).any(|w| w[0].level == w[1].level) {
            return Err(CatalogError::Invalid("duplicate realm level".into()));
        }
        self.rewards.luck.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        if self.herbs.iter().any(|h| h.weight < 0.0) {
            return Err(CatalogError::Invalid("herb weight must not be negative".into()));
        }
        Ok(())
    }

    pub fn realm(&self, level: u32) -> Option<&Realm> {
        self.realms.iter().find(|r| r.level == level)
    }

    pub fn next_realm(&self, level: u32) -> Option<&Realm> {
        self.realms.iter().find(|r| r.level > level)
    }

    pub fn first_realm(&self) -> Option<&Realm> {
        self.realms.first()
    }

    pub fn monster(&self, id: i64) -> Option<&Monster> {
        self.monsters.iter().find(|m| m.id == id)
    }

    pub fn is_exorcism(&self, monster_id: i64) -> bool {
        monster_id >= self.policy.exorcism_threshold
    }

    /// Factor for a uniform draw `u ∈ [0,1)`; 1.0 if no tier covers it.
    pub fn luck_factor(&self, u: f64) -> f64 {
        self.rewards
            .luck
            .iter()
            .find(|tier| tier.threshold >= u)
            .map_or(1.0, |tier| tier.factor)
    }

    /// Row for a fresh registration, starting in the first realm.
    pub fn new_player(&self, now_millis: i64) -> NewPlayer {
        let (realm, max_cultivation) = self
            .first_realm()
            .map_or(("Mortal".to_string(), 100.0), |r| (r.name.clone(), r.max_cultivation));
        let s = &self.starter;
        NewPlayer {
            realm,
            max_cultivation,
            spirit: s.spirit,
            spirit_rate: s.spirit_rate,
            spirit_stones: s.spirit_stones,
            reinforce_stones: s.reinforce_stones,
            refinement_stones: s.refinement_stones,
            pet_essence: s.pet_essence,
            base_attributes: s.attributes.to_value(),
            now_millis,
        }
    }

    pub fn enhance_cost(&self, level: u32) -> i64 {
        self.policy.enhance_cost_base * (i64::from(level) + 1)
    }

    pub fn enhance_success_rate(&self, level: u32) -> f64 {
        let table = &self.policy.enhance_success;
        table
            .get(level as usize)
            .or(table.last())
            .copied()
            .unwrap_or(1.0)
    }

    pub fn pet_upgrade_cost(&self, level: u32) -> i64 {
        self.policy.pet_upgrade_cost_base * i64::from(level)
    }

    pub fn pet_evolve_cost(&self, star: u32) -> i64 {
        self.policy.pet_evolve_cost_base * (i64::from(star) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let catalog = Catalog::default();
        assert_eq!(catalog.realm(1).unwrap().max_cultivation, 100.0);
        assert_eq!(catalog.next_realm(1).unwrap().level, 2);
        assert!(catalog.next_realm(9).is_none());
        assert!(catalog.is_exorcism(1001));
        assert!(!catalog.is_exorcism(2));
        assert_eq!(catalog.monster(2).unwrap().stats.base.health, 180.0);
    }

    #[test]
    fn luck_walks_ascending_thresholds() {
        let catalog = Catalog::default();
        assert_eq!(catalog.luck_factor(0.0), 3.0);
        assert_eq!(catalog.luck_factor(0.01), 3.0);
        assert_eq!(catalog.luck_factor(0.05), 2.5);
        assert_eq!(catalog.luck_factor(0.2), 1.5);
        assert_eq!(catalog.luck_factor(0.99), 1.0);
    }

    #[test]
    fn costs_follow_policy() {
        let catalog = Catalog::default();
        assert_eq!(catalog.enhance_cost(0), 10);
        assert_eq!(catalog.enhance_cost(4), 50);
        assert_eq!(catalog.policy.reforge_cost, 10);
        assert_eq!(catalog.enhance_success_rate(0), 1.0);
        assert_eq!(catalog.enhance_success_rate(50), 0.3);
        assert_eq!(catalog.pet_upgrade_cost(3), 30);
        assert_eq!(catalog.pet_evolve_cost(0), 100);
    }

    #[test]
    fn toml_overrides_and_sorts() {
        let text = r#"
            [[realms]]
            level = 2
            name = "Second"
            max_cultivation = 50.0

            [[realms]]
            level = 1
            name = "First"
            max_cultivation = 10.0

            [[monsters]]
            id = 7
            name = "Rat"
            level = 1
            [monsters.stats.base]
            attack = 3.0
            health = 20.0

            [[rewards.luck]]
            threshold = 1.0
            factor = 1.0

            [[rewards.luck]]
            threshold = 0.5
            factor = 2.0

            [policy]
            daily_duel_limit = 3
            enhance_cost_base = 25
        "#;
        let catalog = Catalog::from_toml_str(text).unwrap();
        assert_eq!(catalog.realms[0].name, "First");
        assert_eq!(catalog.monster(7).unwrap().stats.base.attack, 3.0);
        assert_eq!(catalog.luck_factor(0.3), 2.0);
        assert_eq!(catalog.policy.daily_duel_limit, 3);
        assert_eq!(catalog.enhance_cost(1), 50);
        // Untouched sections keep their defaults.
        assert_eq!(catalog.policy.reforge_cost, 10);
        assert_eq!(catalog.rewards.spirit_stones.base, 10.0);
        assert!(catalog.herbs.len() >= 4);
    }

    #[test]
    fn empty_realm_table_is_rejected() {
        assert!(matches!(
            Catalog::from_toml_str("realms = []"),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, "[policy]\npve_spirit_cost = 2.5\n").unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.policy.pve_spirit_cost, 2.5);
        assert_eq!(catalog.realms.len(), 9);
    }
}
