use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::PlayerDbError;

/// A player row. Attribute bundles are kept as JSON; the game layer owns
/// their typed shape.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: i64,
    pub username: String,
    pub level: u32,
    pub realm: String,
    pub cultivation: f64,
    pub max_cultivation: f64,
    pub spirit: f64,
    pub spirit_rate: f64,
    pub spirit_stones: i64,
    pub reinforce_stones: i64,
    pub refinement_stones: i64,
    pub pet_essence: i64,
    /// Intrinsic bundle before equipment and pet bonuses.
    pub base_attributes: Value,
    /// Final bundle used in combat.
    pub combat_attributes: Value,
    /// Millis of the last spirit accrual.
    pub last_spirit_gain_time: i64,
    pub name_change_count: u32,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// Starter values for a newly registered player.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub realm: String,
    pub max_cultivation: f64,
    pub spirit: f64,
    pub spirit_rate: f64,
    pub spirit_stones: i64,
    pub reinforce_stones: i64,
    pub refinement_stones: i64,
    pub pet_essence: i64,
    pub base_attributes: Value,
    pub now_millis: i64,
}

const PLAYER_COLUMNS: &str = "id, username, level, realm, cultivation, max_cultivation, spirit, spirit_rate, \
     spirit_stones, reinforce_stones, refinement_stones, pet_essence, base_attributes, combat_attributes, \
     last_spirit_gain_time, name_change_count, created_at, last_login";

fn parse_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or(Value::Object(Default::default()))
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    let base: String = row.get(12)?;
    let combat: String = row.get(13)?;
    Ok(PlayerRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        level: row.get(2)?,
        realm: row.get(3)?,
        cultivation: row.get(4)?,
        max_cultivation: row.get(5)?,
        spirit: row.get(6)?,
        spirit_rate: row.get(7)?,
        spirit_stones: row.get(8)?,
        reinforce_stones: row.get(9)?,
        refinement_stones: row.get(10)?,
        pet_essence: row.get(11)?,
        base_attributes: parse_json(&base),
        combat_attributes: parse_json(&combat),
        last_spirit_gain_time: row.get(14)?,
        name_change_count: row.get(15)?,
        created_at: row.get(16)?,
        last_login: row.get(17)?,
    })
}

/// Repository for player rows.
pub struct PlayerRepo<'a> {
    conn: &'a Connection,
}

impl<'a> PlayerRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Register a player. The combat bundle starts equal to the base bundle.
    pub fn create(&self, username: &str, password: &str, starter: &NewPlayer) -> Result<PlayerRecord, PlayerDbError> {
        if self.get_by_username(username)?.is_some() {
            return Err(PlayerDbError::AccountExists(username.to_string()));
        }

        let password_hash = hash_password(password)?;
        let attributes = serde_json::to_string(&starter.base_attributes).unwrap_or_else(|_| "{}".to_string());

        self.conn.execute(
            "INSERT INTO players (username, password_hash, realm, max_cultivation, spirit, spirit_rate,
                 spirit_stones, reinforce_stones, refinement_stones, pet_essence,
                 base_attributes, combat_attributes, last_spirit_gain_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12)",
            rusqlite::params![
                username,
                password_hash,
                starter.realm,
                starter.max_cultivation,
                starter.spirit,
                starter.spirit_rate,
                starter.spirit_stones,
                starter.reinforce_stones,
                starter.refinement_stones,
                starter.pet_essence,
                attributes,
                starter.now_millis,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        tracing::info!(player_id = id, username, "player registered");
        self.load(id)
    }

    /// Verify credentials and stamp `last_login`.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<PlayerRecord, PlayerDbError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash FROM players WHERE username = ?1",
                rusqlite::params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, password_hash)) = row else {
            return Err(PlayerDbError::AccountNotFound(username.to_string()));
        };

        verify_password(password, &password_hash)?;

        self.conn.execute(
            "UPDATE players SET last_login = datetime('now') WHERE id = ?1",
            rusqlite::params![id],
        )?;
        self.load(id)
    }

    pub fn load(&self, id: i64) -> Result<PlayerRecord, PlayerDbError> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1");
        self.conn
            .query_row(&sql, rusqlite::params![id], player_from_row)
            .optional()?
            .ok_or(PlayerDbError::PlayerNotFound(id))
    }

    /// Look up by username (case-insensitive).
    pub fn get_by_username(&self, username: &str) -> Result<Option<PlayerRecord>, PlayerDbError> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE username = ?1");
        Ok(self
            .conn
            .query_row(&sql, rusqlite::params![username], player_from_row)
            .optional()?)
    }

    /// Persist an accrual: spirit and its anchor move together.
    pub fn update_spirit(&self, id: i64, spirit: f64, anchor_millis: i64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET spirit = ?1, last_spirit_gain_time = ?2 WHERE id = ?3",
            rusqlite::params![spirit, anchor_millis, id],
        )?;
        self.expect_row(rows, id)
    }

    /// Credit spirit without moving the accrual anchor. Returns `(old, new)`.
    pub fn add_spirit(&self, id: i64, amount: f64) -> Result<(f64, f64), PlayerDbError> {
        let old = self.load(id)?.spirit;
        let new = ((old + amount) * 10.0).round() / 10.0;
        self.conn.execute(
            "UPDATE players SET spirit = ?1 WHERE id = ?2",
            rusqlite::params![new, id],
        )?;
        Ok((old, new))
    }

    pub fn set_spirit_anchor(&self, id: i64, anchor_millis: i64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET last_spirit_gain_time = ?1 WHERE id = ?2",
            rusqlite::params![anchor_millis, id],
        )?;
        self.expect_row(rows, id)
    }

    pub fn set_spirit_rate(&self, id: i64, rate: f64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET spirit_rate = ?1 WHERE id = ?2",
            rusqlite::params![rate, id],
        )?;
        self.expect_row(rows, id)
    }

    /// `(reinforce_stones, refinement_stones)`.
    pub fn equipment_resources(&self, id: i64) -> Result<(i64, i64), PlayerDbError> {
        self.conn
            .query_row(
                "SELECT reinforce_stones, refinement_stones FROM players WHERE id = ?1",
                rusqlite::params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(PlayerDbError::PlayerNotFound(id))
    }

    pub fn set_equipment_resources(&self, id: i64, reinforce: i64, refinement: i64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET reinforce_stones = ?1, refinement_stones = ?2 WHERE id = ?3",
            rusqlite::params![reinforce, refinement, id],
        )?;
        self.expect_row(rows, id)
    }

    pub fn pet_essence(&self, id: i64) -> Result<i64, PlayerDbError> {
        self.conn
            .query_row(
                "SELECT pet_essence FROM players WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(PlayerDbError::PlayerNotFound(id))
    }

    pub fn set_pet_essence(&self, id: i64, essence: i64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET pet_essence = ?1 WHERE id = ?2",
            rusqlite::params![essence, id],
        )?;
        self.expect_row(rows, id)
    }

    pub fn set_combat_attributes(&self, id: i64, attributes: &Value) -> Result<(), PlayerDbError> {
        let text = serde_json::to_string(attributes).unwrap_or_else(|_| "{}".to_string());
        let rows = self.conn.execute(
            "UPDATE players SET combat_attributes = ?1 WHERE id = ?2",
            rusqlite::params![text, id],
        )?;
        self.expect_row(rows, id)
    }

    /// Deduct spirit if the balance covers it. Returns the remaining spirit.
    pub fn spend_spirit(&self, id: i64, amount: f64) -> Result<f64, PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET spirit = spirit - ?1 WHERE id = ?2 AND spirit >= ?1",
            rusqlite::params![amount, id],
        )?;
        if rows == 0 {
            self.load(id)?;
            return Err(PlayerDbError::InsufficientSpirit {
                player_id: id,
                needed: amount,
            });
        }
        Ok(self.load(id)?.spirit)
    }

    /// Add cultivation, capped at the realm maximum. Returns the new value.
    pub fn add_cultivation(&self, id: i64, amount: f64) -> Result<f64, PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET cultivation = MIN(max_cultivation, cultivation + ?1) WHERE id = ?2",
            rusqlite::params![amount, id],
        )?;
        self.expect_row(rows, id)?;
        Ok(self.load(id)?.cultivation)
    }

    /// Advance to the next realm and reset cultivation.
    pub fn breakthrough(&self, id: i64, level: u32, realm: &str, max_cultivation: f64) -> Result<(), PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET level = ?1, realm = ?2, max_cultivation = ?3, cultivation = 0 WHERE id = ?4",
            rusqlite::params![level, realm, max_cultivation, id],
        )?;
        self.expect_row(rows, id)
    }

    pub fn spend_spirit_stones(&self, id: i64, amount: i64) -> Result<i64, PlayerDbError> {
        let rows = self.conn.execute(
            "UPDATE players SET spirit_stones = spirit_stones - ?1 WHERE id = ?2 AND spirit_stones >= ?1",
            rusqlite::params![amount, id],
        )?;
        if rows == 0 {
            self.load(id)?;
            return Err(PlayerDbError::InsufficientSpiritStones {
                player_id: id,
                needed: amount,
            });
        }
        Ok(self.load(id)?.spirit_stones)
    }

    fn expect_row(&self, rows: usize, id: i64) -> Result<(), PlayerDbError> {
        if rows == 0 {
            return Err(PlayerDbError::PlayerNotFound(id));
        }
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String, PlayerDbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PlayerDbError::HashError(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<(), PlayerDbError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PlayerDbError::HashError(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PlayerDbError::InvalidPassword)
}
