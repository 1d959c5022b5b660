//! Instance status and metric sample tracking.
//!
//! Sidecars push a heartbeat (status + a type-specific metric value) on
//! every poll; `InstanceTracker` writes both to the [`Store`] and the
//! autoscaler reads them back as windowed summaries. Writes are unlocked:
//! samples and statuses are per-instance, monotonic, and TTL-bounded, so
//! concurrent writers never corrupt each other.

use std::sync::Arc;

use async_trait::async_trait;
use asc_common::{keys, GroupType, InstanceStatus, Result, ScalingOptions};
use asc_store::Store;
use tracing::warn;

/// One bucket's worth of samples, bucket 0 is the most recent period.
pub type MetricBuckets = Vec<Vec<asc_common::MetricSample>>;

#[async_trait]
pub trait InstanceTracker: Send + Sync {
    /// Write the instance's current status (TTL = `idle_ttl_sec`) and
    /// append one metric sample (TTL = `metric_ttl_sec`). Any store error
    /// aborts the write — the sidecar retries on its next poll.
    async fn track(
        &self,
        status: InstanceStatus,
        metric_value: f64,
        idle_ttl_sec: u64,
        metric_ttl_sec: u64,
    ) -> Result<()>;

    /// Scan-and-mget every live status key for a group. Eventually
    /// consistent: a concurrent write may or may not be observed.
    async fn get_current(&self, group_name: &str) -> Result<Vec<InstanceStatus>>;

    /// `periods_count` buckets of samples bucketed by their own timestamp,
    /// bucket 0 = `[now - period, now)`, bucket `i` = `[now - (i+1)*period,
    /// now - i*period)`. Empty buckets are preserved as empty vectors.
    async fn get_metric_inventory_per_period(
        &self,
        group_name: &str,
        periods_count: u32,
        period_sec: u64,
    ) -> Result<MetricBuckets>;

    /// One summary value per bucket, per the group's workload strategy. An
    /// empty bucket gets the type's neutral `empty_bucket_summary`.
    async fn get_summary_metric_per_period(
        &self,
        group_name: &str,
        group_type: GroupType,
        opts: &ScalingOptions,
        periods_count: u32,
        period_sec: u64,
    ) -> Result<Vec<f64>>;

    /// The most recent metric sample's value per instance in a group, used
    /// by the launcher to rank JVB shutdown victims by stress. Instances
    /// with no sample are simply absent from the map.
    async fn latest_metric_values(&self, group_name: &str) -> Result<std::collections::HashMap<String, f64>>;
}

pub struct StoreTracker {
    store: Arc<dyn Store>,
}

impl StoreTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store_err(e: impl ToString) -> asc_common::AutoscalerError {
        asc_common::AutoscalerError::Store(e.to_string())
    }
}

#[async_trait]
impl InstanceTracker for StoreTracker {
    async fn track(
        &self,
        status: InstanceStatus,
        metric_value: f64,
        idle_ttl_sec: u64,
        metric_ttl_sec: u64,
    ) -> Result<()> {
        let status_key = keys::instance_status(&status.group_name, &status.instance_id);
        let status_payload = serde_json::to_string(&status)?;
        self.store
            .set(&status_key, &status_payload, Some(idle_ttl_sec))
            .await
            .map_err(Self::store_err)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let sample = asc_common::MetricSample {
            timestamp_ms: now_ms,
            value: metric_value,
        };
        let metric_key = keys::metric_available(&status.group_name, &status.instance_id, now_ms);
        let metric_payload = serde_json::to_string(&sample)?;
        self.store
            .set(&metric_key, &metric_payload, Some(metric_ttl_sec))
            .await
            .map_err(Self::store_err)?;

        Ok(())
    }

    async fn get_current(&self, group_name: &str) -> Result<Vec<InstanceStatus>> {
        let keys = self
            .store
            .scan_match(&keys::instance_status_scan_prefix(group_name))
            .await
            .map_err(Self::store_err)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values = self.store.mget(&keys).await.map_err(Self::store_err)?;
        let mut out = Vec::with_capacity(values.len());
        for value in values.into_iter().flatten() {
            match serde_json::from_str::<InstanceStatus>(&value) {
                Ok(status) => out.push(status),
                Err(e) => warn!(error = %e, "dropping unparseable instance status"),
            }
        }
        Ok(out)
    }

    async fn get_metric_inventory_per_period(
        &self,
        group_name: &str,
        periods_count: u32,
        period_sec: u64,
    ) -> Result<MetricBuckets> {
        let keys = self
            .store
            .scan_match(&keys::metric_scan_prefix(group_name))
            .await
            .map_err(Self::store_err)?;

        let mut buckets: MetricBuckets = vec![Vec::new(); periods_count as usize];
        if keys.is_empty() {
            return Ok(buckets);
        }

        let values = self.store.mget(&keys).await.map_err(Self::store_err)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let period_ms = (period_sec as i64).max(1) * 1000;

        for value in values.into_iter().flatten() {
            let sample: asc_common::MetricSample = match serde_json::from_str(&value) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "dropping unparseable metric sample");
                    continue;
                }
            };
            let age_ms = now_ms - sample.timestamp_ms;
            if age_ms < 0 {
                continue;
            }
            let bucket = (age_ms / period_ms) as usize;
            if bucket < periods_count as usize {
                buckets[bucket].push(sample);
            }
        }

        Ok(buckets)
    }

    async fn get_summary_metric_per_period(
        &self,
        group_name: &str,
        group_type: GroupType,
        opts: &ScalingOptions,
        periods_count: u32,
        period_sec: u64,
    ) -> Result<Vec<f64>> {
        let buckets = self
            .get_metric_inventory_per_period(group_name, periods_count, period_sec)
            .await?;

        if buckets.iter().all(Vec::is_empty) {
            warn!(group = %group_name, "empty metric window, autoscaler will treat this as no-signal");
        }

        Ok(buckets
            .iter()
            .map(|bucket| {
                if bucket.is_empty() {
                    group_type.empty_bucket_summary(opts)
                } else {
                    let values: Vec<f64> = bucket.iter().map(|s| s.value).collect();
                    group_type.summarize(&values)
                }
            })
            .collect())
    }

    async fn latest_metric_values(&self, group_name: &str) -> Result<std::collections::HashMap<String, f64>> {
        let keys = self
            .store
            .scan_match(&keys::metric_scan_prefix(group_name))
            .await
            .map_err(Self::store_err)?;
        if keys.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let values = self.store.mget(&keys).await.map_err(Self::store_err)?;
        let mut latest: std::collections::HashMap<String, (i64, f64)> = std::collections::HashMap::new();

        for (key, value) in keys.iter().zip(values.into_iter()) {
            let Some(value) = value else { continue };
            let Some((instance_id, _ts)) = keys::parse_metric_key(key) else {
                continue;
            };
            let sample: asc_common::MetricSample = match serde_json::from_str(&value) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "dropping unparseable metric sample");
                    continue;
                }
            };
            latest
                .entry(instance_id.to_string())
                .and_modify(|(ts, v)| {
                    if sample.timestamp_ms > *ts {
                        *ts = sample.timestamp_ms;
                        *v = sample.value;
                    }
                })
                .or_insert((sample.timestamp_ms, sample.value));
        }

        Ok(latest.into_iter().map(|(id, (_ts, v))| (id, v)).collect())
    }
}
