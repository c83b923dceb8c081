use rusqlite::Connection;

use crate::error::PlayerDbError;

pub fn create_tables(conn: &Connection) -> Result<(), PlayerDbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS players (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            username              TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash         TEXT NOT NULL,
            level                 INTEGER NOT NULL DEFAULT 1,
            realm                 TEXT NOT NULL,
            cultivation           REAL NOT NULL DEFAULT 0,
            max_cultivation       REAL NOT NULL,
            spirit                REAL NOT NULL DEFAULT 0,
            spirit_rate           REAL NOT NULL DEFAULT 1.0,
            spirit_stones         INTEGER NOT NULL DEFAULT 0,
            reinforce_stones      INTEGER NOT NULL DEFAULT 0,
            refinement_stones     INTEGER NOT NULL DEFAULT 0,
            pet_essence           INTEGER NOT NULL DEFAULT 0,
            base_attributes       TEXT NOT NULL DEFAULT '{}',
            combat_attributes     TEXT NOT NULL DEFAULT '{}',
            last_spirit_gain_time INTEGER NOT NULL,
            name_change_count     INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL DEFAULT (datetime('now')),
            last_login            TEXT
        );

        CREATE TABLE IF NOT EXISTS equipment (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id  INTEGER NOT NULL REFERENCES players(id),
            name       TEXT NOT NULL,
            slot       TEXT NOT NULL,
            quality    TEXT NOT NULL,
            level      INTEGER NOT NULL DEFAULT 0,
            stats      TEXT NOT NULL DEFAULT '{}',
            equipped   INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_equipment_player ON equipment(player_id);

        CREATE TABLE IF NOT EXISTS pets (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id     INTEGER NOT NULL REFERENCES players(id),
            name          TEXT NOT NULL,
            rarity        INTEGER NOT NULL DEFAULT 1,
            level         INTEGER NOT NULL DEFAULT 1,
            star          INTEGER NOT NULL DEFAULT 0,
            attack_bonus  REAL NOT NULL DEFAULT 0,
            defense_bonus REAL NOT NULL DEFAULT 0,
            health_bonus  REAL NOT NULL DEFAULT 0,
            deployed      INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_pets_player ON pets(player_id);

        CREATE TABLE IF NOT EXISTS herbs (
            player_id INTEGER NOT NULL REFERENCES players(id),
            herb_id   TEXT NOT NULL,
            name      TEXT NOT NULL,
            rarity    TEXT NOT NULL,
            quantity  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, herb_id)
        );

        CREATE TABLE IF NOT EXISTS pill_fragments (
            player_id INTEGER NOT NULL REFERENCES players(id),
            pill_id   TEXT NOT NULL,
            quantity  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, pill_id)
        );

        CREATE TABLE IF NOT EXISTS battle_records (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id     INTEGER NOT NULL REFERENCES players(id),
            opponent_id   INTEGER NOT NULL,
            opponent_name TEXT NOT NULL,
            result        TEXT NOT NULL,
            battle_type   TEXT NOT NULL,
            rewards       TEXT NOT NULL DEFAULT '',
            created_at    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_battle_records_player
            ON battle_records(player_id, battle_type, created_at);
        ",
    )?;
    Ok(())
}
