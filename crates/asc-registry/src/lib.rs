//! `InstanceGroup` CRUD plus the grace-period and scale-down-protection
//! bookkeeping that the autoscaler and launcher read before mutating state.
//!
//! Desired-count writes go through [`GroupRegistry::set_desired_count`],
//! which re-validates `min <= desired <= max` on every write since the
//! invariant must hold after *every* successful write, not just the one
//! the admin API checked at PUT time.

use std::sync::Arc;

use async_trait::async_trait;
use asc_common::{keys, AutoscalerError, InstanceGroup, Result};
use asc_store::Store;
use tracing::info;

#[async_trait]
pub trait GroupRegistry: Send + Sync {
    /// Validate and write a group definition. Used both by the admin PUT
    /// endpoint and by `GROUP_CONFIG_FILE` bootstrap.
    async fn upsert(&self, group: InstanceGroup) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<InstanceGroup>>;

    /// Unordered list of every group definition. Eventually consistent
    /// with concurrent writers, same as any other store scan.
    async fn list(&self) -> Result<Vec<InstanceGroup>>;

    /// Delete a group. `live_instance_count` is supplied by the caller
    /// (from `InstanceTracker::get_current`) since the registry itself has
    /// no view of tracked instances — rejecting here keeps the check at
    /// the same boundary as every other store write.
    async fn delete(&self, name: &str, live_instance_count: usize) -> Result<()>;

    /// Clamp-and-write `desiredCount` only. Callers are expected to hold
    /// `groupLock:<name>` for the duration; the registry itself does not
    /// acquire locks.
    async fn set_desired_count(&self, name: &str, new_desired: u32) -> Result<InstanceGroup>;

    /// Whether `autoScaleGrace:<name>` is currently set.
    async fn is_autoscale_grace_active(&self, name: &str) -> Result<bool>;

    async fn set_autoscale_grace(&self, name: &str, ttl_sec: u64) -> Result<()>;

    async fn is_group_jobs_grace_active(&self) -> Result<bool>;

    async fn set_group_jobs_grace(&self, ttl_sec: u64) -> Result<()>;

    async fn is_sanity_jobs_grace_active(&self) -> Result<bool>;

    async fn set_sanity_jobs_grace(&self, ttl_sec: u64) -> Result<()>;

    /// Mark `instance_id` immune from shutdown-victim selection until TTL.
    async fn set_scale_down_protection(&self, group: &str, instance_id: &str, ttl_sec: u64) -> Result<()>;

    async fn is_scale_down_protected(&self, group: &str, instance_id: &str) -> Result<bool>;

    /// Bootstrap (or reset) the registry from a config-supplied group
    /// list: upsert every entry, overwriting whatever is currently stored.
    /// Used both at startup (`GROUP_CONFIG_FILE`) and by the admin
    /// `POST /groups/actions/reset` action.
    async fn reset_to_baseline(&self, groups: Vec<InstanceGroup>) -> Result<()> {
        for group in groups {
            self.upsert(group).await?;
        }
        Ok(())
    }
}

pub struct StoreGroupRegistry {
    store: Arc<dyn Store>,
}

impl StoreGroupRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store_err(e: impl ToString) -> AutoscalerError {
        AutoscalerError::Store(e.to_string())
    }
}

#[async_trait]
impl GroupRegistry for StoreGroupRegistry {
    async fn upsert(&self, group: InstanceGroup) -> Result<()> {
        group.validate().map_err(AutoscalerError::InvalidGroup)?;
        let payload = serde_json::to_string(&group)?;
        self.store
            .set(&keys::group(&group.name), &payload, None)
            .await
            .map_err(Self::store_err)?;
        info!(group = %group.name, "group upserted");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<InstanceGroup>> {
        let raw = self.store.get(&keys::group(name)).await.map_err(Self::store_err)?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<InstanceGroup>> {
        let group_keys = self
            .store
            .scan_match(keys::group_scan_prefix())
            .await
            .map_err(Self::store_err)?;
        if group_keys.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.store.mget(&group_keys).await.map_err(Self::store_err)?;
        let mut out = Vec::with_capacity(values.len());
        for value in values.into_iter().flatten() {
            out.push(serde_json::from_str(&value)?);
        }
        Ok(out)
    }

    async fn delete(&self, name: &str, live_instance_count: usize) -> Result<()> {
        if live_instance_count > 0 {
            return Err(AutoscalerError::GroupHasActiveInstances(name.to_string()));
        }
        self.store.delete(&keys::group(name)).await.map_err(Self::store_err)?;
        info!(group = %name, "group deleted");
        Ok(())
    }

    async fn set_desired_count(&self, name: &str, new_desired: u32) -> Result<InstanceGroup> {
        let mut group = self
            .get(name)
            .await?
            .ok_or_else(|| AutoscalerError::GroupNotFound(name.to_string()))?;

        let clamped = group.scaling_options.clamp(new_desired as i64);
        group.scaling_options.desired_count = clamped;
        let payload = serde_json::to_string(&group)?;
        self.store
            .set(&keys::group(name), &payload, None)
            .await
            .map_err(Self::store_err)?;
        Ok(group)
    }

    async fn is_autoscale_grace_active(&self, name: &str) -> Result<bool> {
        Ok(self
            .store
            .get(&keys::auto_scale_grace(name))
            .await
            .map_err(Self::store_err)?
            .is_some())
    }

    async fn set_autoscale_grace(&self, name: &str, ttl_sec: u64) -> Result<()> {
        self.store
            .set(&keys::auto_scale_grace(name), "1", Some(ttl_sec))
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn is_group_jobs_grace_active(&self) -> Result<bool> {
        Ok(self
            .store
            .get(keys::group_jobs_grace())
            .await
            .map_err(Self::store_err)?
            .is_some())
    }

    async fn set_group_jobs_grace(&self, ttl_sec: u64) -> Result<()> {
        self.store
            .set(keys::group_jobs_grace(), "1", Some(ttl_sec))
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn is_sanity_jobs_grace_active(&self) -> Result<bool> {
        Ok(self
            .store
            .get(keys::sanity_jobs_grace())
            .await
            .map_err(Self::store_err)?
            .is_some())
    }

    async fn set_sanity_jobs_grace(&self, ttl_sec: u64) -> Result<()> {
        self.store
            .set(keys::sanity_jobs_grace(), "1", Some(ttl_sec))
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn set_scale_down_protection(&self, group: &str, instance_id: &str, ttl_sec: u64) -> Result<()> {
        self.store
            .set(&keys::scale_down_protection(group, instance_id), "1", Some(ttl_sec))
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn is_scale_down_protected(&self, group: &str, instance_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get(&keys::scale_down_protection(group, instance_id))
            .await
            .map_err(Self::store_err)?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_common::{Cloud, GroupType, ScalingOptions};
    use asc_store::MemoryStore;

    fn group(name: &str) -> InstanceGroup {
        InstanceGroup {
            name: name.to_string(),
            group_type: GroupType::Jibri,
            region: "eu".to_string(),
            cloud: Cloud::Oracle,
            instance_configuration_id: "ocid1.instanceconfiguration.1".to_string(),
            compartment_id: "ocid1.compartment.1".to_string(),
            enable_auto_scale: true,
            protected_ttl_sec: None,
            scaling_options: ScalingOptions {
                min_desired: 1,
                max_desired: 5,
                desired_count: 2,
                scale_up_threshold: 1.0,
                scale_down_threshold: 0.3,
                scale_up_quantity: 2,
                scale_down_quantity: 2,
                scale_up_periods_count: 2,
                scale_down_periods_count: 3,
                scale_period_sec: 60,
            },
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.upsert(group("jibri-eu")).await.unwrap();
        let fetched = registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(fetched.scaling_options.desired_count, 2);
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_group() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        let mut g = group("jibri-eu");
        g.scaling_options.min_desired = 10;
        assert!(registry.upsert(g).await.is_err());
    }

    #[tokio::test]
    async fn set_desired_count_clamps_to_bounds() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.upsert(group("jibri-eu")).await.unwrap();

        let updated = registry.set_desired_count("jibri-eu", 100).await.unwrap();
        assert_eq!(updated.scaling_options.desired_count, 5);

        let updated = registry.set_desired_count("jibri-eu", 0).await.unwrap();
        assert_eq!(updated.scaling_options.desired_count, 1);
    }

    #[tokio::test]
    async fn delete_rejects_group_with_live_instances() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.upsert(group("jibri-eu")).await.unwrap();
        assert!(registry.delete("jibri-eu", 3).await.is_err());
        assert!(registry.get("jibri-eu").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_succeeds_with_zero_live_instances() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.upsert(group("jibri-eu")).await.unwrap();
        registry.delete("jibri-eu", 0).await.unwrap();
        assert!(registry.get("jibri-eu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn grace_periods_are_independent_of_each_other() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.set_autoscale_grace("jibri-eu", 60).await.unwrap();
        assert!(registry.is_autoscale_grace_active("jibri-eu").await.unwrap());
        assert!(!registry.is_group_jobs_grace_active().await.unwrap());
        assert!(!registry.is_sanity_jobs_grace_active().await.unwrap());
    }

    #[tokio::test]
    async fn scale_down_protection_is_per_instance() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.set_scale_down_protection("jibri-eu", "i-1", 60).await.unwrap();
        assert!(registry.is_scale_down_protected("jibri-eu", "i-1").await.unwrap());
        assert!(!registry.is_scale_down_protected("jibri-eu", "i-2").await.unwrap());
    }

    #[tokio::test]
    async fn reset_to_baseline_upserts_every_entry() {
        let registry = StoreGroupRegistry::new(Arc::new(MemoryStore::new()));
        registry.reset_to_baseline(vec![group("jibri-eu"), group("jvb-us")]).await.unwrap();
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }
}
