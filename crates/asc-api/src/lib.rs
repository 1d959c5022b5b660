//! Admin/sidecar HTTP surface: group CRUD, sidecar poll/stats/status,
//! health, Prometheus metrics, and the Jibri status webhook, all behind
//! an optional shared-secret bearer token.

pub mod api;
pub mod error;
pub mod health;
pub mod metrics;

pub use api::{ApiDoc, AppState};
pub use error::{ApiError, Result};
