//! Error types for the store module

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store operation error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
