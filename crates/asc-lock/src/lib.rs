//! Distributed lock manager
//!
//! Provides Redis-based named locks for serializing per-group autoscale and
//! launch cycles, and for the scheduler's job-creation tick, across
//! replicas of the controller.
//!
//! # Example
//!
//! ```no_run
//! use asc_lock::LockManager;
//!
//! async fn example() {
//!     let manager = LockManager::connect("redis://localhost:6379").await.unwrap();
//!
//!     let ran = manager
//!         .with_lock("groupLock:jibri-eu", 180_000, || async {
//!             // process this group's autoscale cycle
//!         })
//!         .await
//!         .unwrap();
//!
//!     if ran.is_none() {
//!         // another replica is already handling this group right now
//!     }
//! }
//! ```

mod error;
mod lock;

pub use error::{LockError, Result};
pub use lock::{LockHandle, LockManager, LockParams};
