//! Distributed periodic job pipeline (spec section 4.7): `JobProducer` runs
//! two independent tickers per replica (group tick, sanity tick), each
//! producing jobs under the job-creation lock with a grace-period fast
//! path; `JobWorker` pulls jobs from any replica with bounded concurrency
//! and dispatches them to `Autoscaler`, `InstanceLauncher`, or `SanityLoop`.
//!
//! A `running` flag guards idempotent `start`/`stop`, with one
//! `tokio::spawn` per ticker wrapping a `tokio::time::interval` loop.

pub mod producer;
pub mod worker;

pub use producer::{JobProducer, ProducerConfig};
pub use worker::{JobWorker, WorkerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("registry error: {0}")]
    Registry(#[from] asc_common::AutoscalerError),

    #[error("queue error: {0}")]
    Queue(#[from] asc_jobqueue::QueueError),

    #[error("lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
