use thiserror::Error;

use crate::PlayerId;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("player {0} is not online")]
    NotOnline(PlayerId),

    #[error("cache error: {0}")]
    Cache(#[from] cache::CacheError),
}
