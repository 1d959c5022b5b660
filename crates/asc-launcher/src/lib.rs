//! Per-group launch/shutdown convergence:
//! `LaunchOrShutdownInstancesByGroup` compares tracked inventory against
//! `desiredCount` and either asks the group's `CloudDriver` to launch more
//! instances or flags surplus ones for shutdown.
//!
//! Grounded on the same single-critical-section shape as `asc-autoscaler`
//! (acquire the group lock, do the work, release), since both are per-group
//! convergence loops guarded by `groupLock:<name>`.

use std::sync::Arc;

use asc_common::{ActionType, AuditEntry, AutoscalerError, InstanceStatus, Result};
use asc_cloud::CloudDriverRegistry;
use asc_lock::LockManager;
use asc_registry::GroupRegistry;
use asc_shutdown::ShutdownManager;
use asc_tracker::InstanceTracker;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct LauncherConfig {
    pub group_lock_ttl_ms: u64,
    pub audit_ttl_sec: u64,
    pub shutdown_ttl_sec: u64,
}

pub struct InstanceLauncher {
    registry: Arc<dyn GroupRegistry>,
    tracker: Arc<dyn InstanceTracker>,
    audit: Arc<dyn asc_audit::Audit>,
    shutdown: Arc<dyn ShutdownManager>,
    clouds: Arc<CloudDriverRegistry>,
    locks: Arc<LockManager>,
    config: LauncherConfig,
}

impl InstanceLauncher {
    pub fn new(
        registry: Arc<dyn GroupRegistry>,
        tracker: Arc<dyn InstanceTracker>,
        audit: Arc<dyn asc_audit::Audit>,
        shutdown: Arc<dyn ShutdownManager>,
        clouds: Arc<CloudDriverRegistry>,
        locks: Arc<LockManager>,
        config: LauncherConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            audit,
            shutdown,
            clouds,
            locks,
            config,
        }
    }

    /// Returns `true` if the group was actually processed (lock acquired
    /// and group found), `false` if the lock was contended or the group no
    /// longer exists. Failure to acquire the group lock is not an error —
    /// another replica, or the autoscaler itself, is already holding it.
    pub async fn launch_or_shutdown_instances_by_group(&self, group_name: &str) -> Result<bool> {
        let result = self
            .locks
            .with_group_lock(group_name, self.config.group_lock_ttl_ms, || self.run_locked(group_name))
            .await
            .map_err(|e| AutoscalerError::Lock(e.to_string()))?;

        match result {
            None => Ok(false),
            Some(inner) => inner.map(|()| true),
        }
    }

    async fn run_locked(&self, group_name: &str) -> Result<()> {
        let Some(group) = self.registry.get(group_name).await? else {
            return Ok(());
        };

        self.audit.mark_launcher_run(group_name, self.config.audit_ttl_sec).await?;

        let inventory = self.tracker.get_current(group_name).await?;
        let count = inventory.len() as u32;
        let desired = group.scaling_options.desired_count;

        if count < desired {
            self.launch(&group, count, desired).await?;
        } else if count > desired {
            self.shutdown_surplus(&group, inventory, count - desired).await?;
        }

        Ok(())
    }

    async fn launch(&self, group: &asc_common::InstanceGroup, count: u32, desired: u32) -> Result<()> {
        let needed = desired - count;
        let driver = self
            .clouds
            .get(group.cloud)
            .map_err(|e| AutoscalerError::Cloud(e.to_string()))?;

        let launched = driver
            .launch(group, needed)
            .await
            .map_err(|e| AutoscalerError::Cloud(e.to_string()))?;

        if launched.len() as u32 != needed {
            warn!(
                group = %group.name,
                requested = needed,
                launched = launched.len(),
                "cloud driver launched fewer instances than requested, next tick will retry the remainder"
            );
        }

        if let Some(protected_ttl) = group.protected_ttl_sec {
            for result in &launched {
                self.registry
                    .set_scale_down_protection(&group.name, &result.instance_id, protected_ttl)
                    .await?;
            }
        }

        if !launched.is_empty() {
            let entry = AuditEntry {
                timestamp: chrono::Utc::now(),
                action_type: ActionType::Launch,
                count: launched.len() as u32,
                old_desired_count: desired,
                new_desired_count: desired,
                scale_metrics: Vec::new(),
            };
            self.audit.record(&group.name, entry, self.config.audit_ttl_sec).await?;
            info!(group = %group.name, launched = launched.len(), "launched instances to converge on desired count");
        }

        Ok(())
    }

    async fn shutdown_surplus(
        &self,
        group: &asc_common::InstanceGroup,
        inventory: Vec<InstanceStatus>,
        surplus: u32,
    ) -> Result<()> {
        let latest_metrics = self.tracker.latest_metric_values(&group.name).await?;

        let mut victims = Vec::with_capacity(inventory.len());
        for status in inventory {
            if self
                .registry
                .is_scale_down_protected(&group.name, &status.instance_id)
                .await?
            {
                continue;
            }
            let priority = group.group_type.victim_priority(&status);
            let metric_key = group
                .group_type
                .victim_metric_key(latest_metrics.get(&status.instance_id).copied());
            victims.push((priority, metric_key, status));
        }

        // Lowest priority tier first (best shutdown candidate), then lowest
        // metric key within the tier (e.g. JVB stress), then lexicographic
        // instance ID as the deterministic tie-break.
        victims.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.2.instance_id.cmp(&b.2.instance_id))
        });

        let chosen = victims.into_iter().take(surplus as usize).map(|(_, _, s)| s);
        let mut shut_down = 0u32;

        for victim in chosen {
            self.shutdown
                .signal_shutdown(&victim.instance_id, self.config.shutdown_ttl_sec)
                .await?;

            let entry = AuditEntry {
                timestamp: chrono::Utc::now(),
                action_type: ActionType::Shutdown,
                count: 1,
                old_desired_count: group.scaling_options.desired_count,
                new_desired_count: group.scaling_options.desired_count,
                scale_metrics: Vec::new(),
            };
            self.audit.record(&group.name, entry, self.config.audit_ttl_sec).await?;
            shut_down += 1;
        }

        if shut_down < surplus {
            warn!(
                group = %group.name,
                needed = surplus,
                signaled = shut_down,
                "not enough eligible shutdown victims this tick, remainder left for next"
            );
        } else {
            info!(group = %group.name, signaled = shut_down, "signaled shutdown to converge on desired count");
        }

        Ok(())
    }
}
