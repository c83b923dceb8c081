use presence::PlayerId;
use serde::{Deserialize, Serialize};

/// Client-to-server message (internally tagged JSON). Only keepalive pings
/// travel upstream; everything else goes through the HTTP API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Server-to-client envelope: `{type, userId, timestamp, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub user_id: PlayerId,
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: PushEvent,
}

impl PushMessage {
    pub fn new(user_id: PlayerId, timestamp: i64, event: PushEvent) -> Self {
        Self {
            user_id,
            timestamp,
            event,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

/// Typed payloads; the `type` tag selects the `data` schema.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PushEvent {
    #[serde(rename = "spirit:grow")]
    SpiritGrow(SpiritGrow),
    #[serde(rename = "dungeon:event")]
    Dungeon(DungeonEvent),
    #[serde(rename = "exploration:event")]
    Exploration(DungeonEvent),
    #[serde(rename = "leaderboard:update")]
    Leaderboard(LeaderboardUpdate),
    #[serde(rename = "pong")]
    Pong,
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::SpiritGrow(_) => "spirit:grow",
            PushEvent::Dungeon(_) => "dungeon:event",
            PushEvent::Exploration(_) => "exploration:event",
            PushEvent::Leaderboard(_) => "leaderboard:update",
            PushEvent::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiritGrow {
    pub user_id: PlayerId,
    pub old_spirit: f64,
    pub new_spirit: f64,
    pub gain_amount: f64,
    pub spirit_rate: f64,
    pub elapsed_seconds: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DungeonEventType {
    Start,
    CombatRound,
    Victory,
    Defeat,
    Treasure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonEvent {
    pub user_id: PlayerId,
    pub event_type: DungeonEventType,
    pub dungeon: String,
    pub message: String,
    pub round_num: u32,
    pub player_hp: f64,
    pub enemy_hp: f64,
    pub damage_dealt: f64,
    pub damage_taken: f64,
    pub loot: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardUpdateType {
    Update,
    FullRefresh,
    RankUp,
    RankDown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: PlayerId,
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRank {
    pub rank: u32,
    pub value: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdate {
    #[serde(rename = "type")]
    pub update_type: LeaderboardUpdateType,
    pub category: String,
    pub update_time: i64,
    pub top10: Vec<LeaderboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rank: Option<UserRank>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn unknown_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"move","dx":1}"#).is_err());
    }

    #[test]
    fn serialize_spirit_grow_envelope() {
        let msg = PushMessage::new(
            1,
            10_000,
            PushEvent::SpiritGrow(SpiritGrow {
                user_id: 1,
                old_spirit: 100.0,
                new_spirit: 115.0,
                gain_amount: 15.0,
                spirit_rate: 1.5,
                elapsed_seconds: 10.0,
                timestamp: 10_000,
            }),
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"spirit:grow""#));
        assert!(json.contains(r#""userId":1"#));
        assert!(json.contains(r#""timestamp":10000"#));
        assert!(json.contains(r#""gainAmount":15.0"#));
        assert!(json.contains(r#""newSpirit":115.0"#));
        assert_eq!(msg.kind(), "spirit:grow");
    }

    #[test]
    fn serialize_dungeon_event() {
        let msg = PushMessage::new(
            2,
            5,
            PushEvent::Dungeon(DungeonEvent {
                user_id: 2,
                event_type: DungeonEventType::CombatRound,
                dungeon: "Wolf Den".to_string(),
                message: "round 1".to_string(),
                round_num: 1,
                player_hp: 90.5,
                enemy_hp: 40.0,
                damage_dealt: 10.0,
                damage_taken: 9.5,
                loot: vec![],
                timestamp: 5,
            }),
        );
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "dungeon:event");
        assert_eq!(value["data"]["eventType"], "combat_round");
        assert_eq!(value["data"]["roundNum"], 1);
        assert_eq!(value["data"]["playerHp"], 90.5);
    }

    #[test]
    fn serialize_leaderboard_update_renames_type() {
        let msg = PushMessage::new(
            3,
            1,
            PushEvent::Leaderboard(LeaderboardUpdate {
                update_type: LeaderboardUpdateType::RankUp,
                category: "level".to_string(),
                update_time: 1,
                top10: vec![LeaderboardEntry {
                    rank: 1,
                    user_id: 3,
                    name: "li".to_string(),
                    value: 9.0,
                }],
                user_rank: None,
                timestamp: 1,
            }),
        );
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "leaderboard:update");
        assert_eq!(value["data"]["type"], "rank_up");
        assert_eq!(value["data"]["top10"][0]["userId"], 3);
        assert!(value["data"].get("userRank").is_none());
    }

    #[test]
    fn serialize_pong_has_no_data() {
        let msg = PushMessage::new(4, 9, PushEvent::Pong);
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "pong");
        assert_eq!(value["userId"], 4);
        assert!(value.get("data").is_none());
    }
}
