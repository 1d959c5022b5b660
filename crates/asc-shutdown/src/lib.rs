//! Per-instance shutdown flag (spec section 4.5).
//!
//! A `ShutdownFlag` once set is never cleared by the controller — only TTL
//! expiry removes it, on the assumption that by then the instance is gone.
//! The sidecar's `reconfigure` half of the poll response is always
//! `false`; it's carried in [`ShutdownStatus`] only for wire compatibility
//! with existing sidecar deployments (spec section 9 open question).

use std::sync::Arc;

use async_trait::async_trait;
use asc_common::{keys, AutoscalerError, Result};
use asc_store::Store;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownStatus {
    pub shutdown: bool,
    pub reconfigure: bool,
}

#[async_trait]
pub trait ShutdownManager: Send + Sync {
    /// Set the flag for `instance_id`. Re-setting an already-flagged
    /// instance is a harmless overwrite with a fresh TTL (spec section
    /// 4.4's idempotency note).
    async fn signal_shutdown(&self, instance_id: &str, ttl_sec: u64) -> Result<()>;

    /// What a sidecar poll should see for this instance.
    async fn get_status(&self, instance_id: &str) -> Result<ShutdownStatus>;
}

pub struct StoreShutdownManager {
    store: Arc<dyn Store>,
}

impl StoreShutdownManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ShutdownManager for StoreShutdownManager {
    async fn signal_shutdown(&self, instance_id: &str, ttl_sec: u64) -> Result<()> {
        self.store
            .set(&keys::shutdown(instance_id), "1", Some(ttl_sec))
            .await
            .map_err(|e| AutoscalerError::Store(e.to_string()))?;
        info!(instance_id, "shutdown flag set");
        Ok(())
    }

    async fn get_status(&self, instance_id: &str) -> Result<ShutdownStatus> {
        let flagged = self
            .store
            .get(&keys::shutdown(instance_id))
            .await
            .map_err(|e| AutoscalerError::Store(e.to_string()))?
            .is_some();
        Ok(ShutdownStatus {
            shutdown: flagged,
            reconfigure: false,
        })
    }
}
