//! Combat bundles: four fixed attribute groups with total iteration.
//!
//! Stored as camelCase JSON. Missing fields default to zero so a sparse
//! bundle doubles as an equipment bonus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GameError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseStats {
    pub attack: f64,
    pub health: f64,
    pub defense: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OffensiveRates {
    pub crit_rate: f64,
    pub combo_rate: f64,
    pub counter_rate: f64,
    pub stun_rate: f64,
    pub dodge_rate: f64,
    pub vampire_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resistances {
    pub crit_resist: f64,
    pub combo_resist: f64,
    pub counter_resist: f64,
    pub stun_resist: f64,
    pub dodge_resist: f64,
    pub vampire_resist: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecialStats {
    pub heal_boost: f64,
    pub crit_damage_boost: f64,
    pub crit_damage_reduce: f64,
    pub final_damage_boost: f64,
    pub final_damage_reduce: f64,
    pub combat_boost: f64,
    pub resistance_boost: f64,
}

impl BaseStats {
    fn fields_mut(&mut self) -> [&mut f64; 4] {
        [&mut self.attack, &mut self.health, &mut self.defense, &mut self.speed]
    }
}

impl OffensiveRates {
    fn fields_mut(&mut self) -> [&mut f64; 6] {
        [
            &mut self.crit_rate,
            &mut self.combo_rate,
            &mut self.counter_rate,
            &mut self.stun_rate,
            &mut self.dodge_rate,
            &mut self.vampire_rate,
        ]
    }
}

impl Resistances {
    fn fields_mut(&mut self) -> [&mut f64; 6] {
        [
            &mut self.crit_resist,
            &mut self.combo_resist,
            &mut self.counter_resist,
            &mut self.stun_resist,
            &mut self.dodge_resist,
            &mut self.vampire_resist,
        ]
    }
}

impl SpecialStats {
    fn fields_mut(&mut self) -> [&mut f64; 7] {
        [
            &mut self.heal_boost,
            &mut self.crit_damage_boost,
            &mut self.crit_damage_reduce,
            &mut self.final_damage_boost,
            &mut self.final_damage_reduce,
            &mut self.combat_boost,
            &mut self.resistance_boost,
        ]
    }
}

fn add_fields<const N: usize>(ours: [&mut f64; N], theirs: [&mut f64; N]) {
    for (a, b) in ours.into_iter().zip(theirs) {
        *a += *b;
    }
}

/// A participant's complete combat-relevant numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombatBundle {
    pub base: BaseStats,
    pub rates: OffensiveRates,
    pub resists: Resistances,
    pub specials: SpecialStats,
}

impl CombatBundle {
    pub fn from_value(value: &Value) -> Result<Self, GameError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Value {
        // Plain f64 fields always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Visit every attribute, group by group.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut f64)) {
        self.base.fields_mut().into_iter().for_each(&mut f);
        self.rates.fields_mut().into_iter().for_each(&mut f);
        self.resists.fields_mut().into_iter().for_each(&mut f);
        self.specials.fields_mut().into_iter().for_each(&mut f);
    }

    /// Field-wise sum.
    pub fn add(&mut self, other: &CombatBundle) {
        let mut other = *other;
        add_fields(self.base.fields_mut(), other.base.fields_mut());
        add_fields(self.rates.fields_mut(), other.rates.fields_mut());
        add_fields(self.resists.fields_mut(), other.resists.fields_mut());
        add_fields(self.specials.fields_mut(), other.specials.fields_mut());
    }

    pub fn scale(&mut self, factor: f64) {
        self.for_each_mut(|v| *v *= factor);
    }

    /// Rates and resistances live in [0, 1]; nothing is negative.
    pub fn clamp(&mut self) {
        self.base.fields_mut().into_iter().for_each(|v| *v = v.max(0.0));
        self.rates.fields_mut().into_iter().for_each(|v| *v = v.clamp(0.0, 1.0));
        self.resists.fields_mut().into_iter().for_each(|v| *v = v.clamp(0.0, 1.0));
        self.specials.fields_mut().into_iter().for_each(|v| *v = v.max(0.0));
    }

    /// Speed used for turn order.
    pub fn effective_speed(&self) -> f64 {
        self.base.speed * (1.0 + self.specials.combat_boost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparse_json_defaults_to_zero() {
        let bundle = CombatBundle::from_value(&json!({"base": {"attack": 12.0}, "rates": {"critRate": 0.1}})).unwrap();
        assert_eq!(bundle.base.attack, 12.0);
        assert_eq!(bundle.base.health, 0.0);
        assert_eq!(bundle.rates.crit_rate, 0.1);
        assert_eq!(bundle.specials, SpecialStats::default());
    }

    #[test]
    fn json_uses_camel_case_groups() {
        let mut bundle = CombatBundle::default();
        bundle.resists.stun_resist = 0.25;
        let value = bundle.to_value();
        assert_eq!(value["resists"]["stunResist"], 0.25);
        assert_eq!(CombatBundle::from_value(&value).unwrap(), bundle);
    }

    #[test]
    fn add_is_field_wise() {
        let mut a = CombatBundle::default();
        a.base.attack = 10.0;
        a.specials.heal_boost = 0.1;
        let mut b = CombatBundle::default();
        b.base.attack = 5.0;
        b.rates.combo_rate = 0.2;
        b.specials.heal_boost = 0.05;

        a.add(&b);
        assert_eq!(a.base.attack, 15.0);
        assert_eq!(a.rates.combo_rate, 0.2);
        assert!((a.specials.heal_boost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn clamp_bounds_rates_and_resists() {
        let mut bundle = CombatBundle::default();
        bundle.rates.dodge_rate = 1.4;
        bundle.resists.crit_resist = -0.3;
        bundle.base.defense = -2.0;
        bundle.clamp();
        assert_eq!(bundle.rates.dodge_rate, 1.0);
        assert_eq!(bundle.resists.crit_resist, 0.0);
        assert_eq!(bundle.base.defense, 0.0);
    }

    #[test]
    fn effective_speed_includes_combat_boost() {
        let mut bundle = CombatBundle::default();
        bundle.base.speed = 20.0;
        bundle.specials.combat_boost = 0.5;
        assert_eq!(bundle.effective_speed(), 30.0);
    }
}
