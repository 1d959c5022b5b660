//! `JobProducer`: two independent tickers per replica, each enqueuing jobs
//! under the job-creation lock with a grace-period fast path (spec section
//! 4.7 steps 1-7).

use std::sync::Arc;
use std::time::Duration;

use asc_jobqueue::{JobQueue, JobType};
use asc_lock::LockManager;
use asc_registry::GroupRegistry;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::{Result, SchedulerError};

#[derive(Debug, Clone, Copy)]
pub struct ProducerConfig {
    pub job_creation_lock_ttl_ms: u64,
    pub group_jobs_creation_interval_sec: u64,
    pub sanity_jobs_creation_interval_sec: u64,
    pub group_jobs_creation_grace_period_sec: u64,
    pub sanity_jobs_creation_grace_period_sec: u64,
}

pub struct JobProducer {
    registry: Arc<dyn GroupRegistry>,
    queue: Arc<dyn JobQueue>,
    locks: Arc<LockManager>,
    config: ProducerConfig,
    running: Arc<RwLock<bool>>,
}

impl JobProducer {
    pub fn new(
        registry: Arc<dyn GroupRegistry>,
        queue: Arc<dyn JobQueue>,
        locks: Arc<LockManager>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            registry,
            queue,
            locks,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the group and sanity tickers as background tasks. Idempotent:
    /// calling `start` while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut running = match self.running.try_write() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if *running {
            warn!("job producer already running");
            return;
        }
        *running = true;
        drop(running);

        info!(
            group_interval_sec = self.config.group_jobs_creation_interval_sec,
            sanity_interval_sec = self.config.sanity_jobs_creation_interval_sec,
            "starting job producer"
        );

        let group_self = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(group_self.config.group_jobs_creation_interval_sec));
            loop {
                ticker.tick().await;
                if !*group_self.running.read().await {
                    break;
                }
                if let Err(e) = group_self.group_tick().await {
                    error!(error = %e, "error producing group jobs");
                }
            }
        });

        let sanity_self = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sanity_self.config.sanity_jobs_creation_interval_sec));
            loop {
                ticker.tick().await;
                if !*sanity_self.running.read().await {
                    break;
                }
                if let Err(e) = sanity_self.sanity_tick().await {
                    error!(error = %e, "error producing sanity job");
                }
            }
        });
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("job producer stopped");
    }

    pub async fn group_tick(&self) -> Result<()> {
        if self.registry.is_group_jobs_grace_active().await? {
            debug!("group jobs grace active, skipping tick");
            return Ok(());
        }

        let produced = self
            .locks
            .with_job_creation_lock(self.config.job_creation_lock_ttl_ms, || self.produce_group_jobs())
            .await
            .map_err(|e| SchedulerError::Lock(e.to_string()))?;

        match produced {
            None => debug!("job-creation lock contended, another replica is producing"),
            Some(inner) => inner?,
        }
        Ok(())
    }

    pub async fn sanity_tick(&self) -> Result<()> {
        if self.registry.is_sanity_jobs_grace_active().await? {
            debug!("sanity jobs grace active, skipping tick");
            return Ok(());
        }

        let produced = self
            .locks
            .with_job_creation_lock(self.config.job_creation_lock_ttl_ms, || self.produce_sanity_job())
            .await
            .map_err(|e| SchedulerError::Lock(e.to_string()))?;

        match produced {
            None => debug!("job-creation lock contended, another replica is producing"),
            Some(inner) => inner?,
        }
        Ok(())
    }

    async fn produce_group_jobs(&self) -> Result<()> {
        // Double-checked: another replica may have produced and set the
        // grace key between our fast-path check and acquiring the lock.
        if self.registry.is_group_jobs_grace_active().await? {
            return Ok(());
        }

        let groups = self.registry.list().await?;
        metrics::gauge!("autoscaling_groups_managed").set(groups.len() as f64);

        for group in &groups {
            for job_type in [
                JobType::Autoscale { group_name: group.name.clone() },
                JobType::Launch { group_name: group.name.clone() },
            ] {
                self.enqueue_one(job_type, self.config.group_jobs_creation_interval_sec).await;
            }
        }

        self.registry
            .set_group_jobs_grace(self.config.group_jobs_creation_grace_period_sec)
            .await?;
        Ok(())
    }

    async fn produce_sanity_job(&self) -> Result<()> {
        if self.registry.is_sanity_jobs_grace_active().await? {
            return Ok(());
        }

        let groups = self.registry.list().await?;
        for group in &groups {
            self.enqueue_one(
                JobType::Sanity { group_name: group.name.clone() },
                self.config.sanity_jobs_creation_interval_sec,
            )
            .await;
        }

        self.registry
            .set_sanity_jobs_grace(self.config.sanity_jobs_creation_grace_period_sec)
            .await?;
        Ok(())
    }

    async fn enqueue_one(&self, job_type: JobType, dedupe_ttl_sec: u64) {
        let label = job_type_label(&job_type);
        match self.queue.enqueue(job_type, dedupe_ttl_sec).await {
            Ok(Some(_)) => {
                metrics::counter!("job_create_total", "type" => label).increment(1);
            }
            Ok(None) => {
                // Suppressed by the dedupe window — not a failure, just a
                // no-op tick for this (group, type) pair.
            }
            Err(e) => {
                metrics::counter!("job_create_failure_total", "type" => label).increment(1);
                warn!(error = %e, job_type = label, "failed to enqueue job");
            }
        }
    }
}

fn job_type_label(job_type: &JobType) -> &'static str {
    match job_type {
        JobType::Autoscale { .. } => "autoscale",
        JobType::Launch { .. } => "launch",
        JobType::Sanity { .. } => "sanity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_common::{Cloud, GroupType, InstanceGroup, ScalingOptions};
    use asc_jobqueue::QueuedJob;
    use asc_registry::StoreGroupRegistry;
    use asc_store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingQueue {
        enqueued: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for CountingQueue {
        async fn enqueue(&self, _job_type: JobType, _dedupe_ttl_sec: u64) -> asc_jobqueue::Result<Option<String>> {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            Ok(Some("job-id".to_string()))
        }
        async fn poll(&self, _max_jobs: u32, _visibility_timeout_sec: u64) -> asc_jobqueue::Result<Vec<QueuedJob>> {
            Ok(Vec::new())
        }
        async fn ack(&self, _receipt_handle: &str) -> asc_jobqueue::Result<()> {
            Ok(())
        }
        async fn nack(&self, _receipt_handle: &str, _delay_sec: u64) -> asc_jobqueue::Result<()> {
            Ok(())
        }
        async fn extend_visibility(&self, _receipt_handle: &str, _seconds: u64) -> asc_jobqueue::Result<()> {
            Ok(())
        }
        async fn metrics(&self) -> asc_jobqueue::Result<asc_jobqueue::QueueMetrics> {
            Ok(asc_jobqueue::QueueMetrics::default())
        }
    }

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

    fn config() -> ProducerConfig {
        ProducerConfig {
            job_creation_lock_ttl_ms: 30_000,
            group_jobs_creation_interval_sec: 30,
            sanity_jobs_creation_interval_sec: 240,
            group_jobs_creation_grace_period_sec: 30,
            sanity_jobs_creation_grace_period_sec: 240,
        }
    }

    #[tokio::test]
    async fn group_tick_enqueues_autoscale_and_launch_per_group_then_sets_grace() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store));
        registry.upsert(group("jibri-eu")).await.unwrap();
        registry.upsert(group("jvb-us")).await.unwrap();
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let producer = JobProducer::new(registry.clone(), queue.clone(), Arc::new(LockManager::new_unconnected()), config());

        // Lock has no real redis connection, so drive the inner step
        // directly the same way asc-autoscaler's tests exercise `run_locked`.
        producer.produce_group_jobs().await.unwrap();

        assert_eq!(queue.enqueued.load(Ordering::SeqCst), 4);
        assert!(registry.is_group_jobs_grace_active().await.unwrap());
    }

    #[tokio::test]
    async fn group_tick_is_a_no_op_once_grace_is_active() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store));
        registry.upsert(group("jibri-eu")).await.unwrap();
        registry.set_group_jobs_grace(30).await.unwrap();
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let producer = JobProducer::new(registry, queue.clone(), Arc::new(LockManager::new_unconnected()), config());

        producer.produce_group_jobs().await.unwrap();

        assert_eq!(queue.enqueued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sanity_tick_enqueues_one_job_per_group() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store));
        registry.upsert(group("jibri-eu")).await.unwrap();
        registry.upsert(group("jvb-us")).await.unwrap();
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let producer = JobProducer::new(registry.clone(), queue.clone(), Arc::new(LockManager::new_unconnected()), config());

        producer.produce_sanity_job().await.unwrap();

        assert_eq!(queue.enqueued.load(Ordering::SeqCst), 2);
        assert!(registry.is_sanity_jobs_grace_active().await.unwrap());
    }
}
