use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::PlayerDbError;

#[derive(Debug, Clone)]
pub struct EquipmentRecord {
    pub id: i64,
    pub player_id: i64,
    pub name: String,
    pub slot: String,
    pub quality: String,
    pub level: u32,
    /// Flat attribute bonuses as JSON.
    pub stats: Value,
    pub equipped: bool,
}

#[derive(Debug, Clone)]
pub struct NewEquipment {
    pub player_id: i64,
    pub name: String,
    pub slot: String,
    pub quality: String,
    pub stats: Value,
}

const EQUIPMENT_COLUMNS: &str = "id, player_id, name, slot, quality, level, stats, equipped";

fn equipment_from_row(row: &Row<'_>) -> rusqlite::Result<EquipmentRecord> {
    let stats: String = row.get(6)?;
    Ok(EquipmentRecord {
        id: row.get(0)?,
        player_id: row.get(1)?,
        name: row.get(2)?,
        slot: row.get(3)?,
        quality: row.get(4)?,
        level: row.get(5)?,
        stats: serde_json::from_str(&stats).unwrap_or(Value::Object(Default::default())),
        equipped: row.get(7)?,
    })
}

pub struct EquipmentRepo<'a> {
    conn: &'a Connection,
}

impl<'a> EquipmentRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, item: &NewEquipment) -> Result<EquipmentRecord, PlayerDbError> {
        let stats = serde_json::to_string(&item.stats)?;
        self.conn.execute(
            "INSERT INTO equipment (player_id, name, slot, quality, stats) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![item.player_id, item.name, item.slot, item.quality, stats],
        )?;
        self.load(self.conn.last_insert_rowid())
    }

    pub fn load(&self, id: i64) -> Result<EquipmentRecord, PlayerDbError> {
        let sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1");
        self.conn
            .query_row(&sql, rusqlite::params![id], equipment_from_row)
            .optional()?
            .ok_or(PlayerDbError::EquipmentNotFound(id))
    }

    pub fn list_for_player(&self, player_id: i64) -> Result<Vec<EquipmentRecord>, PlayerDbError> {
        let sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE player_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params![player_id], equipment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn list_equipped(&self, player_id: i64) -> Result<Vec<EquipmentRecord>, PlayerDbError> {
        let sql = format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE player_id = ?1 AND equipped = 1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params![player_id], equipment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Save level and stats after enhance or reforge.
    pub fn update(&self, id: i64, level: u32, stats: &Value) -> Result<(), PlayerDbError> {
        let stats = serde_json::to_string(stats)?;
        let rows = self.conn.execute(
            "UPDATE equipment SET level = ?1, stats = ?2 WHERE id = ?3",
            rusqlite::params![level, stats, id],
        )?;
        if rows == 0 {
            return Err(PlayerDbError::EquipmentNotFound(id));
        }
        Ok(())
    }

    /// Equipping takes the slot from whatever the player had in it.
    pub fn set_equipped(&self, id: i64, equipped: bool) -> Result<(), PlayerDbError> {
        let item = self.load(id)?;
        if equipped {
            self.conn.execute(
                "UPDATE equipment SET equipped = 0 WHERE player_id = ?1 AND slot = ?2 AND id != ?3",
                rusqlite::params![item.player_id, item.slot, id],
            )?;
        }
        self.conn.execute(
            "UPDATE equipment SET equipped = ?1 WHERE id = ?2",
            rusqlite::params![equipped, id],
        )?;
        Ok(())
    }
}
