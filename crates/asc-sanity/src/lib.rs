//! Untracked-instance drift reporting: `ReportUntrackedInstances` diffs
//! the cloud provider's own inventory against what `InstanceTracker` has
//! on record and surfaces the gap as metrics/logs. Purely observational —
//! this loop never mutates state, unlike `asc-autoscaler` and
//! `asc-launcher`, which is why it takes no lock and writes nothing
//! through `GroupRegistry`. Untracked-instance remediation stays an
//! operator decision, not something this loop auto-corrects.

use std::collections::HashSet;
use std::sync::Arc;

use asc_cloud::CloudDriverRegistry;
use asc_common::{AutoscalerError, Result};
use asc_registry::GroupRegistry;
use asc_tracker::InstanceTracker;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SanityConfig {
    /// An admissible ceiling on speculative scale-up, advisory only —
    /// this loop never blocks a scale-up decision by itself, it only
    /// flags when drift crosses it.
    pub max_throttle_threshold: u32,
}

/// Result of diffing one group's cloud-side inventory against its tracked
/// inventory. Never causes a state mutation; callers log/export it.
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    pub group_name: String,
    /// Cloud instances with no tracker entry — likely zombies or
    /// just-provisioned instances whose first heartbeat hasn't landed yet.
    pub untracked_instance_ids: Vec<String>,
    /// Tracker entries with no cloud-side instance — stale records whose
    /// TTL hasn't expired yet.
    pub stale_instance_ids: Vec<String>,
    /// Whether drift has crossed `max_throttle_threshold`; advisory only.
    pub throttle_recommended: bool,
}

pub struct SanityLoop {
    registry: Arc<dyn GroupRegistry>,
    tracker: Arc<dyn InstanceTracker>,
    clouds: Arc<CloudDriverRegistry>,
    config: SanityConfig,
}

impl SanityLoop {
    pub fn new(
        registry: Arc<dyn GroupRegistry>,
        tracker: Arc<dyn InstanceTracker>,
        clouds: Arc<CloudDriverRegistry>,
        config: SanityConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            clouds,
            config,
        }
    }

    /// Enumerate every group and report drift for each. Convenience for
    /// callers outside the job pipeline (e.g. an operator CLI); the
    /// scheduler's Sanity job instead calls `report_untracked_instances`
    /// once per group, one job per group like Autoscale/Launch.
    pub async fn report_all_groups(&self) -> Result<Vec<DriftReport>> {
        let groups = self.registry.list().await?;
        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            reports.push(self.report_untracked_instances(&group.name).await?);
        }
        Ok(reports)
    }

    pub async fn report_untracked_instances(&self, group_name: &str) -> Result<DriftReport> {
        let Some(group) = self.registry.get(group_name).await? else {
            return Ok(DriftReport {
                group_name: group_name.to_string(),
                ..Default::default()
            });
        };

        let driver = self
            .clouds
            .get(group.cloud)
            .map_err(|e| AutoscalerError::Cloud(e.to_string()))?;

        let cloud_instances = driver
            .list_instances(&group)
            .await
            .map_err(|e| AutoscalerError::Cloud(e.to_string()))?;
        let tracked = self.tracker.get_current(group_name).await?;

        let cloud_ids: HashSet<&str> = cloud_instances.iter().map(|i| i.instance_id.as_str()).collect();
        let tracked_ids: HashSet<&str> = tracked.iter().map(|s| s.instance_id.as_str()).collect();

        let untracked_instance_ids: Vec<String> = cloud_ids
            .difference(&tracked_ids)
            .map(|s| s.to_string())
            .collect();
        let stale_instance_ids: Vec<String> = tracked_ids
            .difference(&cloud_ids)
            .map(|s| s.to_string())
            .collect();

        let drift = untracked_instance_ids.len() + stale_instance_ids.len();
        let throttle_recommended = drift as u32 > self.config.max_throttle_threshold;

        metrics::gauge!("autoscaling_group_untracked_instances", "group" => group_name.to_string())
            .set(untracked_instance_ids.len() as f64);
        metrics::gauge!("autoscaling_group_stale_instances", "group" => group_name.to_string())
            .set(stale_instance_ids.len() as f64);

        if !untracked_instance_ids.is_empty() {
            warn!(group = %group_name, count = untracked_instance_ids.len(), "cloud instances with no tracker entry");
        }
        if !stale_instance_ids.is_empty() {
            warn!(group = %group_name, count = stale_instance_ids.len(), "tracked instances absent from cloud inventory");
        }
        if throttle_recommended {
            warn!(group = %group_name, drift, threshold = self.config.max_throttle_threshold, "drift exceeds throttle threshold");
        } else {
            info!(group = %group_name, drift, "sanity check complete");
        }

        Ok(DriftReport {
            group_name: group_name.to_string(),
            untracked_instance_ids,
            stale_instance_ids,
            throttle_recommended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_cloud::custom::CustomDriver;
    use asc_common::{BusyStatus, Cloud, GroupType, Health, InstanceGroup, InstanceStatus, ScalingOptions, WorkloadStatus};
    use asc_registry::StoreGroupRegistry;
    use asc_store::MemoryStore;
    use asc_tracker::StoreTracker;

    fn group(name: &str) -> InstanceGroup {
        InstanceGroup {
            name: name.to_string(),
            group_type: GroupType::Jibri,
            region: "eu".to_string(),
            cloud: Cloud::Custom,
            instance_configuration_id: "cfg".to_string(),
            compartment_id: "compartment".to_string(),
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

    fn jibri_status(group: &str, id: &str) -> InstanceStatus {
        InstanceStatus {
            group_name: group.to_string(),
            instance_id: id.to_string(),
            instance_type: GroupType::Jibri,
            region: "eu".to_string(),
            public_ip: None,
            private_ip: None,
            status: WorkloadStatus::Jibri {
                busy_status: BusyStatus::Idle,
                health: Health::Healthy,
            },
        }
    }

    #[tokio::test]
    async fn reports_untracked_and_stale_instances() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store.clone()));
        let tracker = Arc::new(StoreTracker::new(store));
        let driver = CustomDriver::shared();
        let clouds = Arc::new(CloudDriverRegistry::new().with_driver(Cloud::Custom, driver.clone()));

        registry.upsert(group("jibri-eu")).await.unwrap();
        // Cloud has two instances; tracker only knows about one of them,
        // plus a third the cloud has no record of (stale).
        driver.launch(&group("jibri-eu"), 2).await.unwrap();
        let cloud_ids: Vec<String> = driver
            .list_instances(&group("jibri-eu"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        tracker.track(jibri_status("jibri-eu", &cloud_ids[0]), 1.0, 300, 3600).await.unwrap();
        tracker.track(jibri_status("jibri-eu", "ghost"), 1.0, 300, 3600).await.unwrap();

        let sanity = SanityLoop::new(registry, tracker, clouds, SanityConfig { max_throttle_threshold: 40 });
        let report = sanity.report_untracked_instances("jibri-eu").await.unwrap();

        assert_eq!(report.untracked_instance_ids, vec![cloud_ids[1].clone()]);
        assert_eq!(report.stale_instance_ids, vec!["ghost".to_string()]);
        assert!(!report.throttle_recommended);
    }

    #[tokio::test]
    async fn drift_beyond_threshold_recommends_throttle() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store.clone()));
        let tracker = Arc::new(StoreTracker::new(store));
        let driver = CustomDriver::shared();
        let clouds = Arc::new(CloudDriverRegistry::new().with_driver(Cloud::Custom, driver.clone()));

        registry.upsert(group("jibri-eu")).await.unwrap();
        driver.launch(&group("jibri-eu"), 3).await.unwrap();

        let sanity = SanityLoop::new(registry, tracker, clouds, SanityConfig { max_throttle_threshold: 1 });
        let report = sanity.report_untracked_instances("jibri-eu").await.unwrap();

        assert_eq!(report.untracked_instance_ids.len(), 3);
        assert!(report.throttle_recommended);
    }

    #[tokio::test]
    async fn absent_group_reports_empty_drift() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store.clone()));
        let tracker = Arc::new(StoreTracker::new(store));
        let clouds = Arc::new(CloudDriverRegistry::new());

        let sanity = SanityLoop::new(registry, tracker, clouds, SanityConfig { max_throttle_threshold: 40 });
        let report = sanity.report_untracked_instances("nonexistent").await.unwrap();
        assert!(report.untracked_instance_ids.is_empty());
        assert!(report.stale_instance_ids.is_empty());
    }
}
