use rusqlite::Connection;

use crate::error::PlayerDbError;

#[derive(Debug, Clone, PartialEq)]
pub struct HerbStack {
    pub herb_id: String,
    pub name: String,
    pub rarity: String,
    pub quantity: i64,
}

pub struct HerbRepo<'a> {
    conn: &'a Connection,
}

impl<'a> HerbRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add to an existing stack or create it.
    pub fn add(&self, player_id: i64, herb: &HerbStack) -> Result<(), PlayerDbError> {
        self.conn.execute(
            "INSERT INTO herbs (player_id, herb_id, name, rarity, quantity) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(player_id, herb_id) DO UPDATE SET quantity = quantity + excluded.quantity",
            rusqlite::params![player_id, herb.herb_id, herb.name, herb.rarity, herb.quantity],
        )?;
        Ok(())
    }

    pub fn list_for_player(&self, player_id: i64) -> Result<Vec<HerbStack>, PlayerDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT herb_id, name, rarity, quantity FROM herbs WHERE player_id = ?1 ORDER BY herb_id",
        )?;
        let herbs = stmt
            .query_map(rusqlite::params![player_id], |row| {
                Ok(HerbStack {
                    herb_id: row.get(0)?,
                    name: row.get(1)?,
                    rarity: row.get(2)?,
                    quantity: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(herbs)
    }
}

pub struct PillFragmentRepo<'a> {
    conn: &'a Connection,
}

impl<'a> PillFragmentRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn add(&self, player_id: i64, pill_id: &str, quantity: i64) -> Result<(), PlayerDbError> {
        self.conn.execute(
            "INSERT INTO pill_fragments (player_id, pill_id, quantity) VALUES (?1, ?2, ?3)
             ON CONFLICT(player_id, pill_id) DO UPDATE SET quantity = quantity + excluded.quantity",
            rusqlite::params![player_id, pill_id, quantity],
        )?;
        Ok(())
    }

    pub fn quantity(&self, player_id: i64, pill_id: &str) -> Result<i64, PlayerDbError> {
        let qty = self.conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM pill_fragments WHERE player_id = ?1 AND pill_id = ?2",
            rusqlite::params![player_id, pill_id],
            |row| row.get(0),
        )?;
        Ok(qty)
    }
}
