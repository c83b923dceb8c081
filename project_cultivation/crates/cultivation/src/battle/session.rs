use player_db::BattleKind;
use presence::PlayerId;
use serde::{Deserialize, Serialize};

use crate::attributes::CombatBundle;
use crate::keys;

/// Identifies one fight: `(kind, player, opponent-or-monster)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub kind: BattleKind,
    pub player_id: PlayerId,
    pub opponent_id: i64,
}

impl SessionKey {
    pub fn pvp(player_id: PlayerId, opponent_id: PlayerId) -> Self {
        Self {
            kind: BattleKind::Pvp,
            player_id,
            opponent_id,
        }
    }

    pub fn pve(player_id: PlayerId, monster_id: i64) -> Self {
        Self {
            kind: BattleKind::Pve,
            player_id,
            opponent_id: monster_id,
        }
    }

    pub fn cache_key(&self) -> String {
        keys::session_key(self.kind, self.player_id, self.opponent_id)
    }

    pub fn last_round_key(&self) -> String {
        keys::last_round_key(self.kind, self.player_id, self.opponent_id)
    }
}

/// One side of a fight with its bundle frozen at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    pub id: i64,
    pub name: String,
    pub level: u32,
    pub hp: f64,
    pub max_hp: f64,
    pub bundle: CombatBundle,
}

impl Combatant {
    pub fn new(id: i64, name: impl Into<String>, level: u32, bundle: CombatBundle) -> Self {
        let max_hp = bundle.base.health.max(1.0);
        Self {
            id,
            name: name.into(),
            level,
            hp: max_hp,
            max_hp,
            bundle,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }
}

/// Mid-fight state persisted in the cache between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSession {
    pub round: u32,
    pub player: Combatant,
    pub opponent: Combatant,
    pub log: Vec<String>,
    pub started_at: i64,
}

impl BattleSession {
    pub fn new(player: Combatant, opponent: Combatant, started_at: i64) -> Self {
        Self {
            round: 0,
            player,
            opponent,
            log: Vec::new(),
            started_at,
        }
    }

    pub fn is_over(&self) -> bool {
        !self.player.is_alive() || !self.opponent.is_alive()
    }
}
