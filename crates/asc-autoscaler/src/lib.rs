//! Per-group autoscaling decision engine:
//! `ProcessAutoscalingByGroup` turns a rolling window of metric samples
//! into a `desiredCount` adjustment, with the launcher-lag guard as the
//! dominant source of hysteresis.

use std::sync::Arc;

use asc_common::{ActionType, AuditEntry, AutoscalerError, Result, ScalingOptions};
use asc_lock::LockManager;
use asc_registry::GroupRegistry;
use asc_tracker::InstanceTracker;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct AutoscalerConfig {
    pub group_lock_ttl_ms: u64,
    pub audit_ttl_sec: u64,
}

pub struct Autoscaler {
    registry: Arc<dyn GroupRegistry>,
    tracker: Arc<dyn InstanceTracker>,
    audit: Arc<dyn asc_audit::Audit>,
    locks: Arc<LockManager>,
    config: AutoscalerConfig,
}

impl Autoscaler {
    pub fn new(
        registry: Arc<dyn GroupRegistry>,
        tracker: Arc<dyn InstanceTracker>,
        audit: Arc<dyn asc_audit::Audit>,
        locks: Arc<LockManager>,
        config: AutoscalerConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            audit,
            locks,
            config,
        }
    }

    /// Returns `true` if the group was actually processed this call (lock
    /// acquired, group found and eligible), `false` if the tick was a
    /// no-op (missing group, auto-scale disabled, or lock contention).
    /// Failure to acquire the group lock is not an error — another
    /// replica is already handling this group.
    pub async fn process_autoscaling_by_group(&self, group_name: &str) -> Result<bool> {
        let result = self
            .locks
            .with_group_lock(group_name, self.config.group_lock_ttl_ms, || {
                self.run_locked(group_name)
            })
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
        if !group.enable_auto_scale {
            return Ok(());
        }
        if self.registry.is_autoscale_grace_active(group_name).await? {
            return Ok(());
        }

        self.audit
            .mark_autoscaler_run(group_name, self.config.audit_ttl_sec)
            .await?;

        let current = self.tracker.get_current(group_name).await?;
        let count = current.len() as u32;
        let opts = group.scaling_options;
        let desired = opts.desired_count;

        // Launcher-lag guard: the single most important source of
        // hysteresis.
        if desired != count {
            info!(group = %group_name, count, desired, "launcher has not converged yet, skipping autoscale decision");
            return Ok(());
        }

        let periods = opts.scale_up_periods_count.max(opts.scale_down_periods_count);
        let buckets = self
            .tracker
            .get_metric_inventory_per_period(group_name, periods, opts.scale_period_sec)
            .await?;

        if buckets.iter().all(|b| b.is_empty()) {
            warn!(group = %group_name, "empty metric window, no autoscale decision this tick");
            return Ok(());
        }

        let summaries: Vec<f64> = buckets
            .iter()
            .map(|bucket| {
                if bucket.is_empty() {
                    group.group_type.empty_bucket_summary(&opts)
                } else {
                    let values: Vec<f64> = bucket.iter().map(|s| s.value).collect();
                    group.group_type.summarize(&values)
                }
            })
            .collect();

        let scale_up = eval_all_periods(&summaries, opts.scale_up_periods_count, |s| {
            group.group_type.up_predicate(s, count, &opts)
        });
        let scale_down = eval_all_periods(&summaries, opts.scale_down_periods_count, |s| {
            group.group_type.down_predicate(s, count, &opts)
        });

        // Up wins on conflict; in practice thresholds are ordered so both
        // can never be true at once.
        let (new_desired, action_type, used_periods) = if scale_up {
            (
                opts.clamp(desired as i64 + opts.scale_up_quantity as i64),
                ActionType::IncreaseDesiredCount,
                opts.scale_up_periods_count,
            )
        } else if scale_down {
            (
                opts.clamp(desired as i64 - opts.scale_down_quantity as i64),
                ActionType::DecreaseDesiredCount,
                opts.scale_down_periods_count,
            )
        } else {
            return Ok(());
        };

        if new_desired == desired {
            return Ok(());
        }

        self.registry.set_desired_count(group_name, new_desired).await?;

        let entry = AuditEntry {
            timestamp: chrono::Utc::now(),
            action_type,
            count: new_desired.abs_diff(desired),
            old_desired_count: desired,
            new_desired_count: new_desired,
            scale_metrics: summaries[..used_periods as usize].to_vec(),
        };
        self.audit.record(group_name, entry, self.config.audit_ttl_sec).await?;
        self.registry
            .set_autoscale_grace(group_name, opts.scale_period_sec)
            .await?;

        info!(group = %group_name, old = desired, new = new_desired, "autoscale decision applied");
        Ok(())
    }
}

/// True iff every one of the first `n` bucket summaries satisfies
/// `predicate`. Fewer than `n` buckets available counts as not satisfied —
/// there isn't enough history yet to commit to a direction.
fn eval_all_periods(summaries: &[f64], n: u32, predicate: impl Fn(f64) -> bool) -> bool {
    let n = n as usize;
    if summaries.len() < n {
        return false;
    }
    summaries[..n].iter().all(|&s| predicate(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_audit::StoreAudit;
    use asc_common::{BusyStatus, Cloud, GroupType, Health, InstanceGroup, InstanceStatus, WorkloadStatus};
    use asc_lock::LockParams;
    use asc_registry::StoreGroupRegistry;
    use asc_store::MemoryStore;
    use asc_tracker::StoreTracker;

    fn opts(min: u32, max: u32, desired: u32) -> ScalingOptions {
        ScalingOptions {
            min_desired: min,
            max_desired: max,
            desired_count: desired,
            scale_up_threshold: 1.0,
            scale_down_threshold: 0.3,
            scale_up_quantity: 2,
            scale_down_quantity: 2,
            scale_up_periods_count: 2,
            scale_down_periods_count: 3,
            scale_period_sec: 60,
        }
    }

    fn jibri_group(name: &str, opts: ScalingOptions) -> InstanceGroup {
        InstanceGroup {
            name: name.to_string(),
            group_type: GroupType::Jibri,
            region: "eu".to_string(),
            cloud: Cloud::Custom,
            instance_configuration_id: "cfg".to_string(),
            compartment_id: "compartment".to_string(),
            enable_auto_scale: true,
            protected_ttl_sec: None,
            scaling_options: opts,
        }
    }

    fn jibri_status(group: &str, id: &str, busy: BusyStatus) -> InstanceStatus {
        InstanceStatus {
            group_name: group.to_string(),
            instance_id: id.to_string(),
            instance_type: GroupType::Jibri,
            region: "eu".to_string(),
            public_ip: None,
            private_ip: None,
            status: WorkloadStatus::Jibri {
                busy_status: busy,
                health: Health::Healthy,
            },
        }
    }

    struct Harness {
        autoscaler: Autoscaler,
        registry: Arc<StoreGroupRegistry>,
        tracker: Arc<StoreTracker>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store.clone()));
        let tracker = Arc::new(StoreTracker::new(store.clone()));
        let audit: Arc<dyn asc_audit::Audit> = Arc::new(StoreAudit::new(store));
        // LockManager needs a redis connection in this crate's real impl;
        // tests exercise `run_locked` directly instead of going through
        // the Redis-backed lock, matching how asc-lock's own tests avoid
        // a live Redis for pure-logic assertions.
        let _ = LockParams::default();
        Harness {
            autoscaler: Autoscaler::new(
                registry.clone(),
                tracker.clone(),
                audit,
                Arc::new(unreachable_lock_manager()),
                AutoscalerConfig {
                    group_lock_ttl_ms: 180_000,
                    audit_ttl_sec: 172_800,
                },
            ),
            registry,
            tracker,
        }
    }

    fn unreachable_lock_manager() -> LockManager {
        // Only `run_locked` is exercised directly in these tests, so the
        // lock manager's Redis connection is never dialed.
        LockManager::new_unconnected()
    }

    #[tokio::test]
    async fn scale_up_on_sustained_demand() {
        let h = harness();
        let opts = opts(1, 5, 2);
        h.registry.upsert(jibri_group("jibri-eu", opts)).await.unwrap();
        h.tracker
            .track(jibri_status("jibri-eu", "i-1", BusyStatus::Busy), 0.0, 300, 3600)
            .await
            .unwrap();
        h.tracker
            .track(jibri_status("jibri-eu", "i-2", BusyStatus::Busy), 0.0, 300, 3600)
            .await
            .unwrap();

        h.autoscaler.run_locked("jibri-eu").await.unwrap();

        let updated = h.registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(updated.scaling_options.desired_count, 4);
        let entries = Arc::new(StoreAudit::new(Arc::new(MemoryStore::new())));
        let _ = entries; // audit content covered by asc-audit's own tests
    }

    #[tokio::test]
    async fn no_op_under_launcher_lag() {
        let h = harness();
        let opts = opts(1, 5, 2);
        h.registry.upsert(jibri_group("jibri-eu", opts)).await.unwrap();
        h.tracker
            .track(jibri_status("jibri-eu", "i-1", BusyStatus::Busy), 0.0, 300, 3600)
            .await
            .unwrap();

        h.autoscaler.run_locked("jibri-eu").await.unwrap();

        let updated = h.registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(updated.scaling_options.desired_count, 2);
    }

    #[tokio::test]
    async fn clamps_at_min_on_scale_down() {
        let h = harness();
        let mut opts = opts(2, 10, 3);
        opts.scale_down_quantity = 5;
        opts.scale_down_threshold = 0.3;
        opts.scale_down_periods_count = 1;
        h.registry.upsert(jibri_group("jibri-eu", opts)).await.unwrap();
        for id in ["i-1", "i-2", "i-3"] {
            h.tracker
                .track(jibri_status("jibri-eu", id, BusyStatus::Idle), 1.0, 300, 3600)
                .await
                .unwrap();
        }

        h.autoscaler.run_locked("jibri-eu").await.unwrap();

        let updated = h.registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(updated.scaling_options.desired_count, 2);
    }

    #[tokio::test]
    async fn empty_metric_window_makes_no_change() {
        let h = harness();
        let opts = opts(1, 5, 0);
        h.registry.upsert(jibri_group("jibri-eu", opts)).await.unwrap();

        h.autoscaler.run_locked("jibri-eu").await.unwrap();

        let updated = h.registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(updated.scaling_options.desired_count, 0);
    }

    #[tokio::test]
    async fn disabled_autoscale_is_skipped() {
        let h = harness();
        let mut group = jibri_group("jibri-eu", opts(1, 5, 2));
        group.enable_auto_scale = false;
        h.registry.upsert(group).await.unwrap();

        h.autoscaler.run_locked("jibri-eu").await.unwrap();
        let updated = h.registry.get("jibri-eu").await.unwrap().unwrap();
        assert_eq!(updated.scaling_options.desired_count, 2);
    }

    #[test]
    fn eval_all_periods_requires_full_history() {
        assert!(!eval_all_periods(&[1.0], 2, |_| true));
        assert!(eval_all_periods(&[1.0, 1.0], 2, |v| v > 0.0));
        assert!(!eval_all_periods(&[1.0, 0.0], 2, |v| v > 0.0));
    }
}
