//! Victory rewards.
//!
//! Stones and cultivation follow `floor(base · mult^(level−1))` plus a round
//! bonus that shrinks for long fights, then scale by one luck draw. Ordinary
//! monsters drop a weighted herb instead; exorcism targets pay stones,
//! cultivation and sometimes a pill fragment.

use player_db::{HerbStack, Loot};
use rand::Rng;
use serde::Serialize;

use crate::catalog::{Catalog, HerbDef, Monster, RewardFormula};

/// `floor(base·mult^(level−1)) + min(max_bonus, floor(max(0, coeff − round/20)))`.
pub fn formula_amount(formula: &RewardFormula, level: u32, round: u32) -> f64 {
    let exponent = level.max(1) as i32 - 1;
    let base = (formula.base * formula.multiplier.powi(exponent)).floor();
    let bonus = (formula.round_bonus_coeff - f64::from(round) / 20.0)
        .max(0.0)
        .floor()
        .min(formula.max_round_bonus);
    base + bonus
}

/// Weighted pick; `None` when the table is empty or all weights are zero.
pub fn roll_herb<'a, R: Rng + ?Sized>(herbs: &'a [HerbDef], rng: &mut R) -> Option<&'a HerbDef> {
    let total: f64 = herbs.iter().map(|h| h.weight).sum();
    if total <= 0.0 {
        return None;
    }
    let mut point = rng.random::<f64>() * total;
    for herb in herbs {
        if point < herb.weight {
            return Some(herb);
        }
        point -= herb.weight;
    }
    herbs.iter().rev().find(|h| h.weight > 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    SpiritStone,
    Cultivation,
    Herb,
    PillFragment,
}

/// One reward line as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardItem {
    pub kind: RewardKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub amount: f64,
}

/// What a single victory is worth, before it is credited.
#[derive(Debug, Clone, PartialEq)]
pub struct VictoryRewards {
    pub spirit_stones: i64,
    pub cultivation: f64,
    pub luck: f64,
    pub loot: Vec<Loot>,
}

impl VictoryRewards {
    pub fn items(&self) -> Vec<RewardItem> {
        let mut items = Vec::new();
        if self.spirit_stones > 0 {
            items.push(RewardItem {
                kind: RewardKind::SpiritStone,
                id: None,
                name: None,
                amount: self.spirit_stones as f64,
            });
        }
        if self.cultivation > 0.0 {
            items.push(RewardItem {
                kind: RewardKind::Cultivation,
                id: None,
                name: None,
                amount: self.cultivation,
            });
        }
        for loot in &self.loot {
            items.push(match loot {
                Loot::Herb(herb) => RewardItem {
                    kind: RewardKind::Herb,
                    id: Some(herb.herb_id.clone()),
                    name: Some(herb.name.clone()),
                    amount: herb.quantity as f64,
                },
                Loot::PillFragment { pill_id, quantity } => RewardItem {
                    kind: RewardKind::PillFragment,
                    id: Some(pill_id.clone()),
                    name: None,
                    amount: *quantity as f64,
                },
            });
        }
        items
    }

    /// Short labels for push events.
    pub fn labels(&self) -> Vec<String> {
        self.items()
            .into_iter()
            .map(|item| {
                let what = item
                    .name
                    .or(item.id)
                    .unwrap_or_else(|| match item.kind {
                        RewardKind::SpiritStone => "spirit stones".to_string(),
                        _ => "cultivation".to_string(),
                    });
                format!("{} x{}", what, item.amount)
            })
            .collect()
    }

    /// JSON summary stored on the battle record.
    pub fn describe(&self) -> String {
        serde_json::json!({ "luck": self.luck, "items": self.items() }).to_string()
    }
}

fn scaled(catalog: &Catalog, level: u32, round: u32, luck: f64) -> (i64, f64) {
    let rewards = &catalog.rewards;
    let stones = (formula_amount(&rewards.spirit_stones, level, round) * luck).floor();
    let cultivation = (formula_amount(&rewards.cultivation, level, round) * luck).floor();
    (stones as i64, cultivation)
}

/// Duel win: stones and cultivation.
pub fn roll_pvp<R: Rng + ?Sized>(catalog: &Catalog, level: u32, round: u32, rng: &mut R) -> VictoryRewards {
    let luck = catalog.luck_factor(rng.random());
    let (spirit_stones, cultivation) = scaled(catalog, level, round, luck);
    VictoryRewards {
        spirit_stones,
        cultivation,
        luck,
        loot: Vec::new(),
    }
}

pub fn roll_pve<R: Rng + ?Sized>(
    catalog: &Catalog,
    monster: &Monster,
    level: u32,
    round: u32,
    rng: &mut R,
) -> VictoryRewards {
    if !catalog.is_exorcism(monster.id) {
        let loot = roll_herb(&catalog.herbs, rng)
            .map(|herb| {
                Loot::Herb(HerbStack {
                    herb_id: herb.id.clone(),
                    name: herb.name.clone(),
                    rarity: herb.rarity.clone(),
                    quantity: 1,
                })
            })
            .into_iter()
            .collect();
        return VictoryRewards {
            spirit_stones: 0,
            cultivation: 0.0,
            luck: 1.0,
            loot,
        };
    }

    let luck = catalog.luck_factor(rng.random());
    let (spirit_stones, cultivation) = scaled(catalog, level, round, luck);
    let mut loot = Vec::new();
    if rng.random::<f64>() < catalog.policy.pill_fragment_chance {
        loot.push(Loot::PillFragment {
            pill_id: catalog.policy.pill_fragment_id.clone(),
            quantity: 1,
        });
    }
    VictoryRewards {
        spirit_stones,
        cultivation,
        luck,
        loot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn formula() -> RewardFormula {
        RewardFormula {
            base: 10.0,
            multiplier: 1.2,
            round_bonus_coeff: 5.0,
            max_round_bonus: 5.0,
        }
    }

    #[test]
    fn amount_grows_with_level() {
        assert_eq!(formula_amount(&formula(), 1, 100), 10.0);
        // 10·1.2² = 14.4 → 14
        assert_eq!(formula_amount(&formula(), 3, 100), 14.0);
        assert_eq!(formula_amount(&formula(), 0, 100), 10.0);
    }

    #[test]
    fn round_bonus_shrinks_and_caps() {
        // 5 − 5/20 = 4.75 → 4
        assert_eq!(formula_amount(&formula(), 1, 5), 14.0);
        assert_eq!(formula_amount(&formula(), 1, 0), 15.0);
        let mut generous = formula();
        generous.round_bonus_coeff = 50.0;
        assert_eq!(formula_amount(&generous, 1, 1), 15.0);
        assert_eq!(formula_amount(&formula(), 1, 200), 10.0);
    }

    #[test]
    fn top_luck_tier_is_about_one_percent() {
        let catalog = Catalog::default();
        let mut rng = StdRng::seed_from_u64(2024);
        let samples = 10_000;
        let top = (0..samples)
            .filter(|_| catalog.luck_factor(rng.random()) == 3.0)
            .count();
        let share = top as f64 / samples as f64;
        assert!((0.005..=0.015).contains(&share), "share {share}");
    }

    #[test]
    fn herb_roll_respects_weights() {
        let herbs = vec![
            HerbDef {
                id: "a".into(),
                name: "A".into(),
                rarity: "common".into(),
                weight: 9.0,
            },
            HerbDef {
                id: "b".into(),
                name: "B".into(),
                rarity: "rare".into(),
                weight: 1.0,
            },
            HerbDef {
                id: "z".into(),
                name: "Z".into(),
                rarity: "none".into(),
                weight: 0.0,
            },
        ];
        let mut rng = StdRng::seed_from_u64(9);
        let mut a = 0;
        for _ in 0..5_000 {
            match roll_herb(&herbs, &mut rng).unwrap().id.as_str() {
                "a" => a += 1,
                "b" => {}
                other => panic!("zero-weight herb {other} drawn"),
            }
        }
        let share = a as f64 / 5_000.0;
        assert!((0.87..=0.93).contains(&share), "share {share}");
        assert!(roll_herb(&[], &mut rng).is_none());
    }

    #[test]
    fn ordinary_monster_drops_only_a_herb() {
        let catalog = Catalog::default();
        let boar = catalog.monster(1).unwrap();
        let rewards = roll_pve(&catalog, boar, 5, 3, &mut StdRng::seed_from_u64(1));
        assert_eq!(rewards.spirit_stones, 0);
        assert_eq!(rewards.cultivation, 0.0);
        assert_eq!(rewards.loot.len(), 1);
        assert!(matches!(rewards.loot[0], Loot::Herb(_)));
        assert_eq!(rewards.items()[0].kind, RewardKind::Herb);
    }

    #[test]
    fn exorcism_pays_stones_and_cultivation() {
        let mut catalog = Catalog::default();
        catalog.policy.pill_fragment_chance = 1.0;
        let ghost = catalog.monster(1001).unwrap().clone();
        let rewards = roll_pve(&catalog, &ghost, 1, 100, &mut StdRng::seed_from_u64(3));
        assert!(rewards.spirit_stones >= 10);
        assert!(rewards.cultivation >= 20.0);
        assert_eq!(
            rewards.loot,
            vec![Loot::PillFragment {
                pill_id: "foundation_pill".into(),
                quantity: 1
            }]
        );
        let described: serde_json::Value = serde_json::from_str(&rewards.describe()).unwrap();
        assert_eq!(described["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn pvp_rewards_scale_with_luck() {
        let catalog = Catalog::default();
        let rewards = roll_pvp(&catalog, 1, 100, &mut StdRng::seed_from_u64(5));
        assert_eq!(rewards.spirit_stones, (10.0 * rewards.luck).floor() as i64);
        assert_eq!(rewards.cultivation, (20.0 * rewards.luck).floor());
        assert!(rewards.loot.is_empty());
    }
}
