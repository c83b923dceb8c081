use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("wrong value type at key {key}: expected {expected}, found {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
