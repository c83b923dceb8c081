use cache::CacheError;
use player_db::PlayerDbError;
use presence::{PlayerId, PresenceError};
use thiserror::Error;

/// Stable numeric grouping surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCategory {
    Auth = 1,
    Validation = 2,
    State = 3,
    Resource = 4,
    Internal = 5,
}

impl ErrorCategory {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("player {0} is not online")]
    NotOnline(PlayerId),

    #[error("{family} resources for player {player_id} are not cached")]
    NotCached { player_id: PlayerId, family: &'static str },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("battle already active: {0}")]
    AlreadyActive(String),

    #[error("insufficient spirit: need {needed}")]
    InsufficientSpirit { needed: f64 },

    #[error("insufficient {resource}: need {needed}, have {available}")]
    InsufficientResource {
        resource: &'static str,
        needed: i64,
        available: i64,
    },

    #[error("daily limit of {limit} reached")]
    RateLimited { limit: u32 },

    #[error("operation in progress: {0}")]
    LockBusy(String),

    #[error("storage failure: {0}")]
    TransientStorage(String),

    #[error("battle already finished: {0}")]
    BattleOver(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credentials")]
    InvalidCredentials,
}

impl GameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GameError::InvalidCredentials => ErrorCategory::Auth,
            GameError::InvalidRequest(_) => ErrorCategory::Validation,
            GameError::NotOnline(_)
            | GameError::NotCached { .. }
            | GameError::NotFound(_)
            | GameError::AlreadyActive(_)
            | GameError::BattleOver(_)
            | GameError::LockBusy(_) => ErrorCategory::State,
            GameError::InsufficientSpirit { .. }
            | GameError::InsufficientResource { .. }
            | GameError::RateLimited { .. } => ErrorCategory::Resource,
            GameError::TransientStorage(_) => ErrorCategory::Internal,
        }
    }

    /// Machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotOnline(_) => "NOT_ONLINE",
            GameError::NotCached { .. } => "NOT_CACHED",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::AlreadyActive(_) => "ALREADY_ACTIVE",
            GameError::InsufficientSpirit { .. } => "INSUFFICIENT_SPIRIT",
            GameError::InsufficientResource { .. } => "INSUFFICIENT_RESOURCE",
            GameError::RateLimited { .. } => "RATE_LIMITED",
            GameError::LockBusy(_) => "LOCK_BUSY",
            GameError::TransientStorage(_) => "TRANSIENT_STORAGE",
            GameError::BattleOver(_) => "BATTLE_OVER",
            GameError::InvalidRequest(_) => "INVALID_REQUEST",
            GameError::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }
}

impl From<PlayerDbError> for GameError {
    fn from(e: PlayerDbError) -> Self {
        match e {
            PlayerDbError::PlayerNotFound(id) => GameError::NotFound(format!("player {id}")),
            PlayerDbError::EquipmentNotFound(id) => GameError::NotFound(format!("equipment {id}")),
            PlayerDbError::PetNotFound(id) => GameError::NotFound(format!("pet {id}")),
            PlayerDbError::InsufficientSpirit { needed, .. } => GameError::InsufficientSpirit { needed },
            PlayerDbError::InsufficientSpiritStones { needed, .. } => GameError::InsufficientResource {
                resource: "spiritStones",
                needed,
                available: 0,
            },
            PlayerDbError::AccountExists(name) => GameError::InvalidRequest(format!("username taken: {name}")),
            PlayerDbError::AccountNotFound(_) | PlayerDbError::InvalidPassword => GameError::InvalidCredentials,
            other => GameError::TransientStorage(other.to_string()),
        }
    }
}

impl From<CacheError> for GameError {
    fn from(e: CacheError) -> Self {
        GameError::TransientStorage(e.to_string())
    }
}

impl From<PresenceError> for GameError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::NotOnline(id) => GameError::NotOnline(id),
            PresenceError::Cache(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::TransientStorage(format!("bad stored json: {e}"))
    }
}
