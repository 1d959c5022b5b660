use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("queue is stopped")]
    Stopped,
}
