use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::PlayerDbError;

#[derive(Debug, Clone)]
pub struct PetRecord {
    pub id: i64,
    pub player_id: i64,
    pub name: String,
    pub rarity: u32,
    pub level: u32,
    pub star: u32,
    /// Fractional bonuses applied to the owner's base group while deployed.
    pub attack_bonus: f64,
    pub defense_bonus: f64,
    pub health_bonus: f64,
    pub deployed: bool,
}

#[derive(Debug, Clone)]
pub struct NewPet {
    pub player_id: i64,
    pub name: String,
    pub rarity: u32,
    pub attack_bonus: f64,
    pub defense_bonus: f64,
    pub health_bonus: f64,
}

const PET_COLUMNS: &str =
    "id, player_id, name, rarity, level, star, attack_bonus, defense_bonus, health_bonus, deployed";

fn pet_from_row(row: &Row<'_>) -> rusqlite::Result<PetRecord> {
    Ok(PetRecord {
        id: row.get(0)?,
        player_id: row.get(1)?,
        name: row.get(2)?,
        rarity: row.get(3)?,
        level: row.get(4)?,
        star: row.get(5)?,
        attack_bonus: row.get(6)?,
        defense_bonus: row.get(7)?,
        health_bonus: row.get(8)?,
        deployed: row.get(9)?,
    })
}

pub struct PetRepo<'a> {
    conn: &'a Connection,
}

impl<'a> PetRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, pet: &NewPet) -> Result<PetRecord, PlayerDbError> {
        self.conn.execute(
            "INSERT INTO pets (player_id, name, rarity, attack_bonus, defense_bonus, health_bonus)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                pet.player_id,
                pet.name,
                pet.rarity,
                pet.attack_bonus,
                pet.defense_bonus,
                pet.health_bonus
            ],
        )?;
        self.load(self.conn.last_insert_rowid())
    }

    pub fn load(&self, id: i64) -> Result<PetRecord, PlayerDbError> {
        let sql = format!("SELECT {PET_COLUMNS} FROM pets WHERE id = ?1");
        self.conn
            .query_row(&sql, rusqlite::params![id], pet_from_row)
            .optional()?
            .ok_or(PlayerDbError::PetNotFound(id))
    }

    pub fn list_for_player(&self, player_id: i64) -> Result<Vec<PetRecord>, PlayerDbError> {
        let sql = format!("SELECT {PET_COLUMNS} FROM pets WHERE player_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let pets = stmt
            .query_map(rusqlite::params![player_id], pet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pets)
    }

    pub fn deployed(&self, player_id: i64) -> Result<Option<PetRecord>, PlayerDbError> {
        let sql = format!("SELECT {PET_COLUMNS} FROM pets WHERE player_id = ?1 AND deployed = 1 LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![player_id], pet_from_row)
            .optional()?)
    }

    /// Save progression after upgrade or evolve.
    pub fn update(&self, pet: &PetRecord) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE pets SET level = ?1, star = ?2, attack_bonus = ?3, defense_bonus = ?4, health_bonus = ?5
             WHERE id = ?6",
            rusqlite::params![
                pet.level,
                pet.star,
                pet.attack_bonus,
                pet.defense_bonus,
                pet.health_bonus,
                pet.id
            ],
        )?;
        if rows == 0 {
            return Err(PlayerDbError::PetNotFound(pet.id));
        }
        Ok(())
    }

    /// At most one pet is deployed; deploying recalls the previous one.
    pub fn set_deployed(&self, id: i64, deployed: bool) -> Result<(), PlayerDbError> {
        let pet = self.load(id)?;
        if deployed {
            self.conn.execute(
                "UPDATE pets SET deployed = 0 WHERE player_id = ?1 AND id != ?2",
                rusqlite::params![pet.player_id, id],
            )?;
        }
        self.conn.execute(
            "UPDATE pets SET deployed = ?1 WHERE id = ?2",
            rusqlite::params![deployed, id],
        )?;
        Ok(())
    }
}
