//! Per-group audit trail.
//!
//! Every autoscale decision and launch/shutdown action appends an
//! [`AuditEntry`] under `audit:<group>` (spec section 6), and every
//! autoscaler/launcher pass stamps `lastAutoScalerRun:<group>` /
//! `lastLauncherRun:<group>` so the sanity loop and the admin API can tell
//! how long a group has gone unprocessed.

use std::sync::Arc;

use async_trait::async_trait;
use asc_common::{keys, AuditEntry, Result};
use asc_store::Store;
use chrono::{DateTime, Utc};

/// Cap on retained entries per group; the TTL on the whole key bounds
/// retention in time, this bounds it in count so one noisy group can't grow
/// its audit key unboundedly within that window.
const MAX_ENTRIES_PER_GROUP: usize = 500;

#[async_trait]
pub trait Audit: Send + Sync {
    async fn record(&self, group: &str, entry: AuditEntry, ttl_sec: u64) -> Result<()>;

    async fn list(&self, group: &str) -> Result<Vec<AuditEntry>>;

    async fn mark_autoscaler_run(&self, group: &str, ttl_sec: u64) -> Result<()>;

    async fn last_autoscaler_run(&self, group: &str) -> Result<Option<DateTime<Utc>>>;

    async fn mark_launcher_run(&self, group: &str, ttl_sec: u64) -> Result<()>;

    async fn last_launcher_run(&self, group: &str) -> Result<Option<DateTime<Utc>>>;
}

pub struct StoreAudit {
    store: Arc<dyn Store>,
}

impl StoreAudit {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn mark_run(&self, key: &str, ttl_sec: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.store
            .set(key, &now, Some(ttl_sec))
            .await
            .map_err(|e| asc_common::AutoscalerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn last_run(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|e| asc_common::AutoscalerError::Store(e.to_string()))?;
        Ok(raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))))
    }
}

#[async_trait]
impl Audit for StoreAudit {
    async fn record(&self, group: &str, entry: AuditEntry, ttl_sec: u64) -> Result<()> {
        let key = keys::audit(group);
        let mut entries = self.list(group).await?;
        entries.push(entry);
        if entries.len() > MAX_ENTRIES_PER_GROUP {
            let overflow = entries.len() - MAX_ENTRIES_PER_GROUP;
            entries.drain(0..overflow);
        }
        let payload = serde_json::to_string(&entries)?;
        self.store
            .set(&key, &payload, Some(ttl_sec))
            .await
            .map_err(|e| asc_common::AutoscalerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, group: &str) -> Result<Vec<AuditEntry>> {
        let key = keys::audit(group);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(|e| asc_common::AutoscalerError::Store(e.to_string()))?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn mark_autoscaler_run(&self, group: &str, ttl_sec: u64) -> Result<()> {
        self.mark_run(&keys::last_autoscaler_run(group), ttl_sec).await
    }

    async fn last_autoscaler_run(&self, group: &str) -> Result<Option<DateTime<Utc>>> {
        self.last_run(&keys::last_autoscaler_run(group)).await
    }

    async fn mark_launcher_run(&self, group: &str, ttl_sec: u64) -> Result<()> {
        self.mark_run(&keys::last_launcher_run(group), ttl_sec).await
    }

    async fn last_launcher_run(&self, group: &str) -> Result<Option<DateTime<Utc>>> {
        self.last_run(&keys::last_launcher_run(group)).await
    }
}
