//! Autoscaling controller entry point: loads `AppConfig`, wires the
//! Store/LockManager/registry/tracker/audit/shutdown-manager stack, the
//! cloud driver registry, the job producer/worker pair, and the admin/
//! sidecar HTTP surface, then serves until a signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use asc_api::AppState;
use asc_audit::{Audit, StoreAudit};
use asc_autoscaler::{Autoscaler, AutoscalerConfig};
use asc_cloud::{custom::CustomDriver, digitalocean::DigitalOceanDriver, oracle::OracleDriver, CloudDriverRegistry};
use asc_common::{Cloud, InstanceGroup};
use asc_config::AppConfig;
use asc_jobqueue::{JobQueue, RedisJobQueue};
use asc_launcher::{InstanceLauncher, LauncherConfig};
use asc_lock::LockManager;
use asc_registry::{GroupRegistry, StoreGroupRegistry};
use asc_sanity::SanityLoop;
use asc_scheduler::{JobProducer, JobWorker, ProducerConfig, WorkerConfig};
use asc_shutdown::{ShutdownManager, StoreShutdownManager};
use asc_store::{MemoryStore, RedisStore, Store};
use asc_tracker::{InstanceTracker, StoreTracker};
use tracing::{error, info};

#[derive(serde::Deserialize)]
struct GroupConfigFile {
    #[serde(rename = "groupEntries")]
    group_entries: Vec<InstanceGroup>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    asc_common::logging::init_logging("asc-controller");
    info!("starting autoscaling controller");

    let config = AppConfig::load()?;
    config.cloud.validate()?;

    let store: Arc<dyn Store> = if config.dev_mode {
        info!("dev_mode enabled, using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::connect(&config.redis.url()).await?)
    };

    let locks = if config.dev_mode {
        Arc::new(LockManager::new_unconnected())
    } else {
        Arc::new(LockManager::connect_with_params(&config.redis.url(), asc_lock::LockParams::default()).await?)
    };

    let registry: Arc<dyn GroupRegistry> = Arc::new(StoreGroupRegistry::new(store.clone()));
    let tracker: Arc<dyn InstanceTracker> = Arc::new(StoreTracker::new(store.clone()));
    let audit: Arc<dyn Audit> = Arc::new(StoreAudit::new(store.clone()));
    let shutdown: Arc<dyn ShutdownManager> = Arc::new(StoreShutdownManager::new(store.clone()));

    bootstrap_groups(&config, registry.as_ref()).await?;

    let clouds = Arc::new(build_cloud_registry(&config));

    let autoscaler = Arc::new(Autoscaler::new(
        registry.clone(),
        tracker.clone(),
        audit.clone(),
        locks.clone(),
        AutoscalerConfig {
            group_lock_ttl_ms: config.locks.group_lock_ttl_ms,
            audit_ttl_sec: config.ttl.audit_ttl_sec,
        },
    ));

    let launcher = Arc::new(InstanceLauncher::new(
        registry.clone(),
        tracker.clone(),
        audit.clone(),
        shutdown.clone(),
        clouds.clone(),
        locks.clone(),
        LauncherConfig {
            group_lock_ttl_ms: config.locks.group_lock_ttl_ms,
            audit_ttl_sec: config.ttl.audit_ttl_sec,
            shutdown_ttl_sec: config.ttl.shutdown_ttl_sec,
        },
    ));

    let sanity = Arc::new(SanityLoop::new(
        registry.clone(),
        tracker.clone(),
        clouds.clone(),
        asc_sanity::SanityConfig {
            max_throttle_threshold: config.sanity.max_throttle_threshold,
        },
    ));

    // No in-memory JobQueue implementation exists in this workspace, so
    // the job pipeline always runs against Redis regardless of
    // `dev_mode` (which only swaps the Store/LockManager backend).
    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::connect(&config.redis.url()).await?);

    let producer = Arc::new(JobProducer::new(
        registry.clone(),
        queue.clone(),
        locks.clone(),
        ProducerConfig {
            job_creation_lock_ttl_ms: config.locks.job_creation_lock_ttl_ms,
            group_jobs_creation_interval_sec: config.jobs.group_jobs_creation_interval_sec,
            sanity_jobs_creation_interval_sec: config.jobs.sanity_jobs_creation_interval_sec,
            group_jobs_creation_grace_period_sec: config.jobs.group_jobs_creation_grace_period_sec,
            sanity_jobs_creation_grace_period_sec: config.jobs.sanity_jobs_creation_grace_period_sec,
        },
    ));
    producer.start();

    let worker = Arc::new(JobWorker::new(
        queue,
        autoscaler,
        launcher,
        sanity,
        WorkerConfig {
            worker_concurrency: config.jobs.worker_concurrency,
            poll_interval_ms: 1_000,
            autoscaler_processing_timeout_ms: config.jobs.autoscaler_processing_timeout_ms(&config.locks),
            sanity_loop_processing_timeout_ms: config.sanity.sanity_loop_processing_timeout_ms,
        },
    ));
    worker.start();

    let metrics_handle = asc_api::metrics::install_recorder();

    let state = AppState {
        registry,
        tracker,
        audit,
        shutdown,
        clouds,
        locks,
        metrics_handle,
        group_lock_ttl_ms: config.locks.group_lock_ttl_ms,
        idle_ttl_sec: config.ttl.idle_ttl_sec,
        metric_ttl_sec: config.ttl.metric_ttl_sec,
        shutdown_ttl_sec: config.ttl.shutdown_ttl_sec,
        audit_ttl_sec: config.ttl.audit_ttl_sec,
    };

    let app = state.router(config.auth.clone());
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    info!(%addr, "admin/sidecar HTTP surface listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(producer, worker))
        .await?;

    info!("autoscaling controller stopped");
    Ok(())
}

/// Spec section 7 makes an unreadable or unparseable `group_config_file`
/// fatal once it's been explicitly configured — unlike the cloud/lock
/// errors below this, there's no sensible degraded mode to fall back to,
/// since the operator asked for a specific baseline and didn't get it.
async fn bootstrap_groups(config: &AppConfig, registry: &dyn GroupRegistry) -> anyhow::Result<()> {
    let Some(path) = &config.group_config_file else {
        info!("no group_config_file configured, starting with zero groups");
        return Ok(());
    };
    if path.is_empty() {
        info!("group_config_file is empty, starting with zero groups");
        return Ok(());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("group_config_file '{path}' is configured but unreadable: {e}"))?;
    let parsed: GroupConfigFile = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("group_config_file '{path}' is not valid JSON: {e}"))?;

    let count = parsed.group_entries.len();
    registry.reset_to_baseline(parsed.group_entries).await?;
    info!(path, count, "bootstrapped group registry from group_config_file");
    Ok(())
}

fn build_cloud_registry(config: &AppConfig) -> CloudDriverRegistry {
    let mut registry = CloudDriverRegistry::new();
    for provider in &config.cloud.providers {
        match provider.as_str() {
            "oracle" => {
                registry = registry.with_driver(Cloud::Oracle, Arc::new(OracleDriver::new(config.cloud.oracle.clone())));
            }
            "digitalocean" => {
                registry = registry.with_driver(
                    Cloud::Digitalocean,
                    Arc::new(DigitalOceanDriver::new(config.cloud.digitalocean.clone())),
                );
            }
            "custom" => {
                registry = registry.with_driver(Cloud::Custom, CustomDriver::shared());
            }
            other => {
                error!(provider = other, "unknown cloud provider in config, skipping");
            }
        }
    }
    registry
}

async fn shutdown_signal(producer: Arc<JobProducer>, worker: Arc<JobWorker>) {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
    producer.stop().await;
    worker.stop().await;
}
