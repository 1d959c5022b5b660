//! `JobWorker`: pulls jobs from any replica with bounded concurrency and
//! dispatches them to `Autoscaler`, `InstanceLauncher`, or `SanityLoop`
//! (spec section 4.7). `retries=0` — every job is acknowledged exactly once
//! regardless of outcome, since a failed job is left to be re-created by
//! the next producer tick rather than retried within this one.

use std::sync::Arc;
use std::time::Duration;

use asc_autoscaler::Autoscaler;
use asc_jobqueue::{JobQueue, JobType, QueuedJob};
use asc_launcher::InstanceLauncher;
use asc_sanity::SanityLoop;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::interval;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub worker_concurrency: usize,
    pub poll_interval_ms: u64,
    /// `autoscalerProcessingTimeoutMs` (= `groupLockTTL`) — shared by
    /// Autoscale and Launch jobs since both hold the group lock.
    pub autoscaler_processing_timeout_ms: u64,
    /// `sanityLoopProcessingTimeoutMs` — Sanity holds no group lock, so
    /// it gets its own timeout.
    pub sanity_loop_processing_timeout_ms: u64,
}

impl WorkerConfig {
    fn visibility_timeout_sec(&self) -> u64 {
        let longest_ms = self.autoscaler_processing_timeout_ms.max(self.sanity_loop_processing_timeout_ms);
        (longest_ms / 1000).max(1)
    }
}

pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    autoscaler: Arc<Autoscaler>,
    launcher: Arc<InstanceLauncher>,
    sanity: Arc<SanityLoop>,
    semaphore: Arc<Semaphore>,
    config: WorkerConfig,
    running: Arc<RwLock<bool>>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        autoscaler: Arc<Autoscaler>,
        launcher: Arc<InstanceLauncher>,
        sanity: Arc<SanityLoop>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            autoscaler,
            launcher,
            sanity,
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn start(self: &Arc<Self>) {
        let mut running = match self.running.try_write() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if *running {
            warn!("job worker already running");
            return;
        }
        *running = true;
        drop(running);

        let worker = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(worker.config.poll_interval_ms));
            loop {
                ticker.tick().await;
                if !*worker.running.read().await {
                    break;
                }
                worker.poll_and_dispatch().await;
            }
        });
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn poll_and_dispatch(self: &Arc<Self>) {
        let visibility = self.config.visibility_timeout_sec();
        let jobs = match self.queue.poll(self.config.worker_concurrency as u32, visibility).await {
            Ok(jobs) => jobs,
            Err(e) => {
                metrics::counter!("queue_error_total").increment(1);
                error!(error = %e, "failed to poll job queue");
                return;
            }
        };

        if let Ok(queue_metrics) = self.queue.metrics().await {
            metrics::gauge!("queue_waiting").set(queue_metrics.visible as f64);
        }

        for queued in jobs {
            if queued.job.receive_count > 1 {
                metrics::counter!("queue_stalled_total").increment(1);
                warn!(job_id = %queued.job.id, receive_count = queued.job.receive_count, "reprocessing stalled job");
            }

            let worker = self.clone();
            tokio::spawn(async move {
                let Ok(_permit) = worker.semaphore.clone().acquire_owned().await else {
                    return;
                };
                worker.process(queued).await;
            });
        }
    }

    async fn process(&self, queued: QueuedJob) {
        let label = job_type_label(&queued.job.job_type);
        let timeout = Duration::from_millis(match &queued.job.job_type {
            JobType::Autoscale { .. } | JobType::Launch { .. } => self.config.autoscaler_processing_timeout_ms,
            JobType::Sanity { .. } => self.config.sanity_loop_processing_timeout_ms,
        });

        let outcome = tokio::time::timeout(timeout, self.run_job(&queued.job.job_type)).await;

        match outcome {
            Ok(Ok(())) => {
                metrics::counter!("job_process_total", "type" => label).increment(1);
                debug!(job_id = %queued.job.id, job_type = label, "job processed");
            }
            Ok(Err(e)) => {
                metrics::counter!("job_process_failure_total", "type" => label).increment(1);
                warn!(job_id = %queued.job.id, job_type = label, error = %e, "job failed, will be re-created next tick");
            }
            Err(_) => {
                metrics::counter!("job_process_failure_total", "type" => label).increment(1);
                warn!(job_id = %queued.job.id, job_type = label, "job timed out, will be re-created next tick");
            }
        }

        // retries=0: acknowledge unconditionally so the job never retries
        // within this tick, success or failure.
        if let Err(e) = self.queue.ack(&queued.receipt_handle).await {
            metrics::counter!("queue_error_total").increment(1);
            error!(job_id = %queued.job.id, error = %e, "failed to ack job");
        }
    }

    async fn run_job(&self, job_type: &JobType) -> asc_common::Result<()> {
        match job_type {
            JobType::Autoscale { group_name } => {
                self.autoscaler.process_autoscaling_by_group(group_name).await?;
            }
            JobType::Launch { group_name } => {
                self.launcher.launch_or_shutdown_instances_by_group(group_name).await?;
            }
            JobType::Sanity { group_name } => {
                self.sanity.report_untracked_instances(group_name).await?;
            }
        }
        Ok(())
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
    use asc_audit::StoreAudit;
    use asc_autoscaler::AutoscalerConfig;
    use asc_cloud::CloudDriverRegistry;
    use asc_common::{Cloud, GroupType, InstanceGroup, ScalingOptions};
    use asc_jobqueue::{Job, QueueMetrics};
    use asc_launcher::LauncherConfig;
    use asc_lock::LockManager;
    use asc_registry::StoreGroupRegistry;
    use asc_shutdown::StoreShutdownManager;
    use asc_store::MemoryStore;
    use asc_tracker::StoreTracker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct OneShotQueue {
        job: Mutex<Option<Job>>,
        acked: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for OneShotQueue {
        async fn enqueue(&self, _job_type: JobType, _dedupe_ttl_sec: u64) -> asc_jobqueue::Result<Option<String>> {
            Ok(None)
        }

        async fn poll(&self, _max_jobs: u32, _visibility_timeout_sec: u64) -> asc_jobqueue::Result<Vec<QueuedJob>> {
            let mut slot = self.job.lock().unwrap();
            match slot.take() {
                Some(job) => Ok(vec![QueuedJob { receipt_handle: job.id.clone(), job }]),
                None => Ok(Vec::new()),
            }
        }

        async fn ack(&self, _receipt_handle: &str) -> asc_jobqueue::Result<()> {
            self.acked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn nack(&self, _receipt_handle: &str, _delay_sec: u64) -> asc_jobqueue::Result<()> {
            Ok(())
        }

        async fn extend_visibility(&self, _receipt_handle: &str, _seconds: u64) -> asc_jobqueue::Result<()> {
            Ok(())
        }

        async fn metrics(&self) -> asc_jobqueue::Result<QueueMetrics> {
            Ok(QueueMetrics::default())
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
                desired_count: 1,
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

    fn worker_config() -> WorkerConfig {
        WorkerConfig {
            worker_concurrency: 4,
            poll_interval_ms: 50,
            autoscaler_processing_timeout_ms: 180_000,
            sanity_loop_processing_timeout_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn processing_a_launch_job_acks_it_and_converges_the_group() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreGroupRegistry::new(store.clone()));
        registry.upsert(group("jibri-eu")).await.unwrap();
        let tracker = Arc::new(StoreTracker::new(store.clone()));
        let audit: Arc<dyn asc_audit::Audit> = Arc::new(StoreAudit::new(store.clone()));
        let shutdown = Arc::new(StoreShutdownManager::new(store));
        let clouds = Arc::new(CloudDriverRegistry::new().with_driver(Cloud::Custom, asc_cloud::custom::CustomDriver::shared()));
        let locks = Arc::new(LockManager::new_unconnected());

        let autoscaler = Arc::new(Autoscaler::new(
            registry.clone(),
            tracker.clone(),
            audit.clone(),
            locks.clone(),
            AutoscalerConfig { group_lock_ttl_ms: 180_000, audit_ttl_sec: 172_800 },
        ));
        let launcher = Arc::new(InstanceLauncher::new(
            registry.clone(),
            tracker.clone(),
            audit.clone(),
            shutdown,
            clouds.clone(),
            locks.clone(),
            LauncherConfig { group_lock_ttl_ms: 180_000, audit_ttl_sec: 172_800, shutdown_ttl_sec: 86_400 },
        ));
        let sanity = Arc::new(SanityLoop::new(
            registry,
            tracker,
            clouds,
            asc_sanity::SanityConfig { max_throttle_threshold: 40 },
        ));

        let queue = Arc::new(OneShotQueue {
            job: Mutex::new(Some(Job::new(JobType::Launch { group_name: "jibri-eu".to_string() }))),
            acked: AtomicUsize::new(0),
        });

        let worker = Arc::new(JobWorker::new(queue.clone(), autoscaler, launcher, sanity, worker_config()));
        worker.poll_and_dispatch().await;
        // `process` is spawned onto its own task; give it a moment to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(queue.acked.load(Ordering::SeqCst), 1);
    }
}
