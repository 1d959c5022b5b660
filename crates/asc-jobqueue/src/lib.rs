//! Reliable job queue for autoscale, launch, and sanity jobs.

pub mod error;
pub mod job;
pub mod redis_queue;

pub use error::QueueError;
pub use job::{Job, JobType, QueuedJob};
pub use redis_queue::{JobQueue, QueueMetrics, RedisJobQueue};

pub type Result<T> = std::result::Result<T, QueueError>;
