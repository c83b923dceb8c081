use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerDbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("player not found: {0}")]
    PlayerNotFound(i64),

    #[error("equipment not found: {0}")]
    EquipmentNotFound(i64),

    #[error("pet not found: {0}")]
    PetNotFound(i64),

    #[error("player {player_id} lacks {needed} spirit")]
    InsufficientSpirit { player_id: i64, needed: f64 },

    #[error("player {player_id} lacks {needed} spirit stones")]
    InsufficientSpiritStones { player_id: i64, needed: i64 },

    #[error("password hashing error: {0}")]
    HashError(String),
}
