//! Single-round resolution.
//!
//! The faster side (`speed × (1 + combatBoost)`, ties to the player) acts
//! first; the other side answers unless it was stunned or killed. Every
//! effect rolls independently in `[0, 1)` against `rate − resist`.

use rand::Rng;

use super::session::{BattleSession, Combatant};

/// Dodge and counter chances never exceed this.
pub const EVASION_CAP: f64 = 0.8;
/// Share of base damage returned to a vampiric attacker.
pub const VAMPIRE_RATIO: f64 = 0.2;

pub fn chance(rate: f64, resist: f64, cap: f64) -> f64 {
    (rate - resist).clamp(0.0, cap)
}

/// `max(1, damage − defense)`.
pub fn base_damage(attacker: &Combatant, defender: &Combatant) -> f64 {
    (attacker.bundle.base.attack - defender.bundle.base.defense).max(1.0)
}

/// What happened during one act.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActOutcome {
    pub base: f64,
    /// Damage actually removed from the defender.
    pub damage: f64,
    pub crit: bool,
    pub combo: bool,
    pub stun: bool,
    pub dodged: bool,
    pub counter: bool,
    pub heal: f64,
    pub line: String,
}

pub fn resolve_act<R: Rng + ?Sized>(attacker: &mut Combatant, defender: &mut Combatant, rng: &mut R) -> ActOutcome {
    let a = attacker.bundle;
    let d = defender.bundle;
    let base = base_damage(attacker, defender);

    let crit = rng.random::<f64>() < chance(a.rates.crit_rate, d.resists.crit_resist, 1.0);
    let combo = rng.random::<f64>() < chance(a.rates.combo_rate, d.resists.combo_resist, 1.0);
    let vampire = rng.random::<f64>() < chance(a.rates.vampire_rate, d.resists.vampire_resist, 1.0);
    let stun = rng.random::<f64>() < chance(a.rates.stun_rate, d.resists.stun_resist, 1.0);

    let mut total = base;
    if crit {
        total += base;
    }
    if combo {
        total += base;
    }

    let dodged = rng.random::<f64>() < chance(d.rates.dodge_rate, a.resists.dodge_resist, EVASION_CAP);
    let damage = if dodged {
        0.0
    } else {
        let dealt = total.min(defender.hp);
        defender.hp = (defender.hp - total).max(0.0);
        dealt
    };
    // Descriptive only: logged, no extra act.
    let counter = rng.random::<f64>() < chance(d.rates.counter_rate, a.resists.counter_resist, EVASION_CAP);

    let mut heal = 0.0;
    if vampire {
        let before = attacker.hp;
        attacker.hp = (attacker.hp + base * VAMPIRE_RATIO).min(attacker.max_hp);
        heal = attacker.hp - before;
    }

    let mut tags = Vec::new();
    if crit {
        tags.push("crit");
    }
    if combo {
        tags.push("combo");
    }
    if vampire {
        tags.push("vampire");
    }
    if stun {
        tags.push("stun");
    }
    let mut line = if dodged {
        format!("{} dodges {}'s attack (base {base})", defender.name, attacker.name)
    } else {
        format!("{} hits {} for {total} (base {base})", attacker.name, defender.name)
    };
    if !tags.is_empty() {
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    if counter {
        line.push_str(&format!("; {} readies a counter", defender.name));
    }

    ActOutcome {
        base,
        damage,
        crit,
        combo,
        stun,
        dodged,
        counter,
        heal,
        line,
    }
}

/// Summary of one resolved round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    pub player_first: bool,
    pub lines: Vec<String>,
    /// Damage the player dealt this round.
    pub damage_dealt: f64,
    /// Damage the player took this round.
    pub damage_taken: f64,
}

pub fn player_acts_first(session: &BattleSession) -> bool {
    session.player.bundle.effective_speed() >= session.opponent.bundle.effective_speed()
}

/// Run one round on `session`. The round counter is the caller's concern.
pub fn resolve_round<R: Rng + ?Sized>(session: &mut BattleSession, rng: &mut R) -> RoundReport {
    let player_first = player_acts_first(session);
    let round = session.round;
    let mut report = RoundReport {
        player_first,
        ..RoundReport::default()
    };

    let (first, second) = if player_first {
        (&mut session.player, &mut session.opponent)
    } else {
        (&mut session.opponent, &mut session.player)
    };

    let opening = resolve_act(first, second, rng);
    report.lines.push(format!("round {round}: {}", opening.line));
    let mut answer = None;
    if second.is_alive() {
        if opening.stun {
            report.lines.push(format!("round {round}: {} is stunned", second.name));
        } else {
            let reply = resolve_act(second, first, rng);
            report.lines.push(format!("round {round}: {}", reply.line));
            answer = Some(reply);
        }
    }

    let (by_player, by_opponent) = if player_first {
        (Some(&opening), answer.as_ref())
    } else {
        (answer.as_ref(), Some(&opening))
    };
    report.damage_dealt = by_player.map_or(0.0, |a| a.damage);
    report.damage_taken = by_opponent.map_or(0.0, |a| a.damage);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::CombatBundle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter(id: i64, name: &str, attack: f64, health: f64, defense: f64, speed: f64) -> Combatant {
        let mut bundle = CombatBundle::default();
        bundle.base.attack = attack;
        bundle.base.health = health;
        bundle.base.defense = defense;
        bundle.base.speed = speed;
        Combatant::new(id, name, 1, bundle)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn base_damage_floors_at_one() {
        let a = fighter(1, "A", 30.0, 100.0, 0.0, 1.0);
        let d = fighter(2, "D", 0.0, 100.0, 45.0, 1.0);
        assert_eq!(base_damage(&a, &d), 1.0);
        let d = fighter(2, "D", 0.0, 100.0, 10.0, 1.0);
        assert_eq!(base_damage(&a, &d), 20.0);
    }

    #[test]
    fn base_damage_is_monotone() {
        let d = fighter(2, "D", 0.0, 100.0, 10.0, 1.0);
        let mut last = 0.0;
        for attack in 0..40 {
            let a = fighter(1, "A", attack as f64, 100.0, 0.0, 1.0);
            let dmg = base_damage(&a, &d);
            assert!(dmg >= last);
            last = dmg;
        }
    }

    #[test]
    fn evasion_is_capped() {
        assert_eq!(chance(0.95, 0.05, EVASION_CAP), 0.8);
        assert_eq!(chance(0.2, 0.5, EVASION_CAP), 0.0);
        assert_eq!(chance(1.5, 0.0, 1.0), 1.0);
    }

    #[test]
    fn plain_round_matches_hand_computation() {
        let mut session = BattleSession::new(
            fighter(1, "p", 50.0, 250.0, 30.0, 20.0),
            fighter(2, "o", 30.0, 200.0, 10.0, 10.0),
            0,
        );
        session.round = 1;
        let report = resolve_round(&mut session, &mut rng());
        assert!(report.player_first);
        assert_eq!(session.opponent.hp, 160.0);
        assert_eq!(session.player.hp, 249.0);
        assert_eq!(report.damage_dealt, 40.0);
        assert_eq!(report.damage_taken, 1.0);
        assert_eq!(report.lines.len(), 2);
    }

    #[test]
    fn speed_tie_goes_to_player_and_combat_boost_counts() {
        let mut session = BattleSession::new(
            fighter(1, "p", 10.0, 100.0, 0.0, 10.0),
            fighter(2, "o", 10.0, 100.0, 0.0, 10.0),
            0,
        );
        assert!(player_acts_first(&session));
        session.opponent.bundle.specials.combat_boost = 0.1;
        assert!(!player_acts_first(&session));
    }

    #[test]
    fn guaranteed_crit_and_combo_triple_damage() {
        let mut a = fighter(1, "A", 20.0, 100.0, 0.0, 1.0);
        a.bundle.rates.crit_rate = 1.0;
        a.bundle.rates.combo_rate = 1.0;
        let mut d = fighter(2, "D", 0.0, 100.0, 10.0, 1.0);
        let out = resolve_act(&mut a, &mut d, &mut rng());
        assert!(out.crit && out.combo);
        assert_eq!(out.damage, 30.0);
        assert_eq!(d.hp, 70.0);
        assert!(out.line.contains("crit, combo"));
    }

    #[test]
    fn stun_skips_the_reply() {
        let mut session = BattleSession::new(
            fighter(1, "p", 20.0, 100.0, 0.0, 20.0),
            fighter(2, "o", 50.0, 100.0, 0.0, 10.0),
            0,
        );
        session.player.bundle.rates.stun_rate = 1.0;
        let report = resolve_round(&mut session, &mut rng());
        assert_eq!(session.player.hp, 100.0);
        assert_eq!(report.damage_taken, 0.0);
        assert!(report.lines[1].contains("stunned"));
    }

    #[test]
    fn stun_resist_cancels_stun() {
        let mut a = fighter(1, "A", 20.0, 100.0, 0.0, 1.0);
        a.bundle.rates.stun_rate = 0.6;
        let mut d = fighter(2, "D", 0.0, 100.0, 0.0, 1.0);
        d.bundle.resists.stun_resist = 0.6;
        let mut r = rng();
        for _ in 0..50 {
            assert!(!resolve_act(&mut a, &mut d, &mut r).stun);
            d.hp = d.max_hp;
        }
    }

    #[test]
    fn vampire_heals_up_to_max() {
        let mut a = fighter(1, "A", 60.0, 100.0, 0.0, 1.0);
        a.bundle.rates.vampire_rate = 1.0;
        a.hp = 95.0;
        let mut d = fighter(2, "D", 0.0, 500.0, 10.0, 1.0);
        let out = resolve_act(&mut a, &mut d, &mut rng());
        // base 50 → heal 10, capped at max_hp.
        assert_eq!(a.hp, 100.0);
        assert_eq!(out.heal, 5.0);
    }

    #[test]
    fn kill_ends_round_before_reply() {
        let mut session = BattleSession::new(
            fighter(1, "p", 500.0, 100.0, 0.0, 20.0),
            fighter(2, "o", 50.0, 100.0, 0.0, 10.0),
            0,
        );
        let report = resolve_round(&mut session, &mut rng());
        assert_eq!(session.opponent.hp, 0.0);
        assert_eq!(session.player.hp, 100.0);
        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.damage_dealt, 100.0);
    }

    #[test]
    fn hp_stays_within_bounds() {
        let mut session = BattleSession::new(
            fighter(1, "p", 40.0, 300.0, 5.0, 12.0),
            fighter(2, "o", 35.0, 280.0, 8.0, 11.0),
            0,
        );
        for bundle in [&mut session.player.bundle, &mut session.opponent.bundle] {
            bundle.rates.crit_rate = 0.3;
            bundle.rates.combo_rate = 0.2;
            bundle.rates.vampire_rate = 0.4;
            bundle.rates.dodge_rate = 0.9;
            bundle.rates.stun_rate = 0.1;
        }
        let mut r = rng();
        while !session.is_over() && session.round < 100 {
            session.round += 1;
            resolve_round(&mut session, &mut r);
            assert!((0.0..=session.player.max_hp).contains(&session.player.hp));
            assert!((0.0..=session.opponent.max_hp).contains(&session.opponent.hp));
        }
    }
}
