use std::path::Path;

use rusqlite::Connection;

use crate::battle_record::{BattleRecordRepo, NewBattleRecord};
use crate::equipment::EquipmentRepo;
use crate::error::PlayerDbError;
use crate::inventory::{HerbRepo, HerbStack, PillFragmentRepo};
use crate::pet::PetRepo;
use crate::player::PlayerRepo;
use crate::schema;

/// Item credited together with a victory.
#[derive(Debug, Clone, PartialEq)]
pub enum Loot {
    Herb(HerbStack),
    PillFragment { pill_id: String, quantity: i64 },
}

/// Everything one victory credits, applied atomically.
#[derive(Debug, Clone)]
pub struct VictoryGrant {
    pub player_id: i64,
    pub spirit_stones: i64,
    pub cultivation: f64,
    pub loot: Vec<Loot>,
    pub record: NewBattleRecord,
}

/// Balances after a committed grant.
#[derive(Debug, Clone, PartialEq)]
pub struct VictoryOutcome {
    pub record_id: i64,
    pub spirit_stones: i64,
    pub cultivation: f64,
}

/// Main database handle wrapping a SQLite connection.
pub struct PlayerDb {
    conn: Connection,
}

impl PlayerDb {
    /// Open (or create) a database at the given file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlayerDbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        tracing::info!(path = %path.display(), "player database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, PlayerDbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn player(&self) -> PlayerRepo<'_> {
        PlayerRepo::new(&self.conn)
    }

    pub fn equipment(&self) -> EquipmentRepo<'_> {
        EquipmentRepo::new(&self.conn)
    }

    pub fn pet(&self) -> PetRepo<'_> {
        PetRepo::new(&self.conn)
    }

    pub fn battle_record(&self) -> BattleRecordRepo<'_> {
        BattleRecordRepo::new(&self.conn)
    }

    pub fn herb(&self) -> HerbRepo<'_> {
        HerbRepo::new(&self.conn)
    }

    pub fn pill_fragment(&self) -> PillFragmentRepo<'_> {
        PillFragmentRepo::new(&self.conn)
    }

    /// Credit stones, cultivation (capped at the realm maximum) and loot, and
    /// append the win record, in one transaction.
    pub fn grant_victory(&mut self, grant: &VictoryGrant) -> Result<VictoryOutcome, PlayerDbError> {
        let tx = self.conn.transaction()?;

        let rows = tx.execute(
            "UPDATE players
             SET spirit_stones = spirit_stones + ?1,
                 cultivation = MIN(max_cultivation, cultivation + ?2)
             WHERE id = ?3",
            rusqlite::params![grant.spirit_stones, grant.cultivation, grant.player_id],
        )?;
        if rows == 0 {
            return Err(PlayerDbError::PlayerNotFound(grant.player_id));
        }

        for item in &grant.loot {
            match item {
                Loot::Herb(herb) => HerbRepo::new(&tx).add(grant.player_id, herb)?,
                Loot::PillFragment { pill_id, quantity } => {
                    PillFragmentRepo::new(&tx).add(grant.player_id, pill_id, *quantity)?
                }
            }
        }

        let record_id = BattleRecordRepo::new(&tx).insert(&grant.record)?;
        let (spirit_stones, cultivation) = tx.query_row(
            "SELECT spirit_stones, cultivation FROM players WHERE id = ?1",
            rusqlite::params![grant.player_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        tx.commit()?;
        Ok(VictoryOutcome {
            record_id,
            spirit_stones,
            cultivation,
        })
    }

    /// Append a loss record; nothing is credited.
    pub fn record_defeat(&self, record: &NewBattleRecord) -> Result<i64, PlayerDbError> {
        self.battle_record().insert(record)
    }
}
