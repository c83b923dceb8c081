//! Cache key layout for game state.

use presence::PlayerId;

use player_db::BattleKind;

pub fn session_key(kind: BattleKind, player_id: PlayerId, opponent_id: i64) -> String {
    format!("session:{}:{player_id}:{opponent_id}", kind.as_str())
}

pub fn last_round_key(kind: BattleKind, player_id: PlayerId, opponent_id: i64) -> String {
    format!("lastRound:{}:{player_id}:{opponent_id}", kind.as_str())
}

pub fn resource_key(family: &str, player_id: PlayerId) -> String {
    format!("res:{family}:{player_id}")
}

pub fn last_op_key(family: &str, player_id: PlayerId) -> String {
    format!("lastOp:{family}:{player_id}")
}

pub fn lock_key(scope: &str, player_id: PlayerId, entity_id: i64, op: &str) -> String {
    format!("lock:{scope}:{player_id}:{entity_id}:{op}")
}

/// Patterns removed when a player goes offline.
pub fn player_cleanup_patterns(player_id: PlayerId) -> [String; 5] {
    [
        format!("session:*:{player_id}:*"),
        format!("lastRound:*:{player_id}:*"),
        format!("lock:equip:{player_id}:*"),
        format!("lock:pet:{player_id}:*"),
        format!("lastOp:*:{player_id}"),
    ]
}

/// Extract the player id from a `res:{family}:{pid}` key.
pub fn parse_resource_key(key: &str) -> Option<PlayerId> {
    key.rsplit(':').next()?.parse().ok()
}
