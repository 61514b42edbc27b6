use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
