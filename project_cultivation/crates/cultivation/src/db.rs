use std::sync::{Arc, Mutex};

use player_db::{PlayerDb, PlayerDbError};

use crate::error::GameError;

/// Durable store shared by request handlers and background jobs.
pub type SharedDb = Arc<Mutex<PlayerDb>>;

pub fn shared(db: PlayerDb) -> SharedDb {
    Arc::new(Mutex::new(db))
}

/// Run `f` with exclusive access to the database.
pub fn with_db<T>(
    db: &SharedDb,
    f: impl FnOnce(&mut PlayerDb) -> Result<T, PlayerDbError>,
) -> Result<T, GameError> {
    let mut guard = db
        .lock()
        .map_err(|_| GameError::TransientStorage("database lock poisoned".into()))?;
    f(&mut guard).map_err(GameError::from)
}
