use rusqlite::{Connection, Row};

use crate::error::PlayerDbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleResult {
    Win,
    Loss,
}

impl BattleResult {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleResult::Win => "win",
            BattleResult::Loss => "loss",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "win" {
            BattleResult::Win
        } else {
            BattleResult::Loss
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattleKind {
    Pvp,
    Pve,
}

impl BattleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleKind::Pvp => "pvp",
            BattleKind::Pve => "pve",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "pvp" {
            BattleKind::Pvp
        } else {
            BattleKind::Pve
        }
    }
}

/// Append-only battle history row.
#[derive(Debug, Clone)]
pub struct BattleRecord {
    pub id: i64,
    pub player_id: i64,
    pub opponent_id: i64,
    pub opponent_name: String,
    pub result: BattleResult,
    pub kind: BattleKind,
    /// Opaque reward description (JSON text).
    pub rewards: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewBattleRecord {
    pub player_id: i64,
    pub opponent_id: i64,
    pub opponent_name: String,
    pub result: BattleResult,
    pub kind: BattleKind,
    pub rewards: String,
    pub created_at: i64,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<BattleRecord> {
    let result: String = row.get(4)?;
    let kind: String = row.get(5)?;
    Ok(BattleRecord {
        id: row.get(0)?,
        player_id: row.get(1)?,
        opponent_id: row.get(2)?,
        opponent_name: row.get(3)?,
        result: BattleResult::parse(&result),
        kind: BattleKind::parse(&kind),
        rewards: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub struct BattleRecordRepo<'a> {
    conn: &'a Connection,
}

impl<'a> BattleRecordRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &NewBattleRecord) -> Result<i64, PlayerDbError> {
        self.conn.execute(
            "INSERT INTO battle_records (player_id, opponent_id, opponent_name, result, battle_type, rewards, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.player_id,
                record.opponent_id,
                record.opponent_name,
                record.result.as_str(),
                record.kind.as_str(),
                record.rewards,
                record.created_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent first.
    pub fn list_for_player(&self, player_id: i64, limit: u32) -> Result<Vec<BattleRecord>, PlayerDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, player_id, opponent_id, opponent_name, result, battle_type, rewards, created_at
             FROM battle_records WHERE player_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let records = stmt
            .query_map(rusqlite::params![player_id, limit], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Battles of `kind` started by the player at or after `since_millis`.
    pub fn count_since(&self, player_id: i64, kind: BattleKind, since_millis: i64) -> Result<u32, PlayerDbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM battle_records WHERE player_id = ?1 AND battle_type = ?2 AND created_at >= ?3",
            rusqlite::params![player_id, kind.as_str(), since_millis],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
