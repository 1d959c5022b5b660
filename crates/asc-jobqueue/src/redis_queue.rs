//! Redis-backed reliable queue: the `score` in a sorted set is each job's
//! next-visible timestamp in epoch milliseconds, so "poll" is a bounded
//! `ZRANGEBYSCORE` and "ack" is a `ZREM`. A worker that claims a job but
//! never acks leaves its score parked in the future until the visibility
//! timeout lapses, at which point the sanity loop's stall detection picks
//! it back up.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::job::{Job, JobType, QueuedJob};
use crate::Result;

const PENDING_KEY: &str = "jobqueue:pending";
const JOBS_KEY: &str = "jobqueue:jobs";

#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub visible: u64,
    pub in_flight: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job unless one with the same dedupe key was already
    /// enqueued within `dedupe_ttl_sec`. Returns `None` when suppressed.
    async fn enqueue(&self, job_type: JobType, dedupe_ttl_sec: u64) -> Result<Option<String>>;

    async fn poll(&self, max_jobs: u32, visibility_timeout_sec: u64) -> Result<Vec<QueuedJob>>;

    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    async fn nack(&self, receipt_handle: &str, delay_sec: u64) -> Result<()>;

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u64) -> Result<()>;

    async fn metrics(&self) -> Result<QueueMetrics>;
}

pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job_type: JobType, dedupe_ttl_sec: u64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let dedupe_key = format!("jobqueue:dedupe:{}", job_type.dedupe_key());

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedupe_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(dedupe_ttl_sec)
            .query_async(&mut conn)
            .await?;

        if claimed.is_none() {
            debug!(dedupe_key = %dedupe_key, "job enqueue suppressed by dedupe window");
            return Ok(None);
        }

        let job = Job::new(job_type);
        let payload = serde_json::to_string(&job)?;
        let now = Self::now_ms();

        redis::pipe()
            .hset(JOBS_KEY, &job.id, &payload)
            .zadd(PENDING_KEY, &job.id, now)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(Some(job.id))
    }

    async fn poll(&self, max_jobs: u32, visibility_timeout_sec: u64) -> Result<Vec<QueuedJob>> {
        let mut conn = self.conn.clone();
        let now = Self::now_ms();

        let candidate_ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(PENDING_KEY)
            .arg(0)
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(max_jobs)
            .query_async(&mut conn)
            .await?;

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        let new_visible_at = now + (visibility_timeout_sec as i64 * 1000);

        for id in candidate_ids {
            // XX + CH: only update (and report) members that still exist,
            // so a job another poller already claimed (or acked) this tick
            // is silently skipped instead of resurrected.
            let changed: i64 = redis::cmd("ZADD")
                .arg(PENDING_KEY)
                .arg("XX")
                .arg("CH")
                .arg(new_visible_at)
                .arg(&id)
                .query_async(&mut conn)
                .await?;

            if changed == 0 {
                continue;
            }

            let payload: Option<String> = redis::cmd("HGET")
                .arg(JOBS_KEY)
                .arg(&id)
                .query_async(&mut conn)
                .await?;

            let Some(payload) = payload else {
                warn!(job_id = %id, "claimed job missing its payload, dropping");
                redis::cmd("ZREM").arg(PENDING_KEY).arg(&id).query_async::<()>(&mut conn).await?;
                continue;
            };

            let mut job: Job = serde_json::from_str(&payload)?;
            job.receive_count += 1;
            let updated_payload = serde_json::to_string(&job)?;
            redis::cmd("HSET")
                .arg(JOBS_KEY)
                .arg(&id)
                .arg(&updated_payload)
                .query_async::<()>(&mut conn)
                .await?;

            claimed.push(QueuedJob {
                job,
                receipt_handle: id,
            });
        }

        Ok(claimed)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .zrem(PENDING_KEY, receipt_handle)
            .hdel(JOBS_KEY, receipt_handle)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str, delay_sec: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let new_visible_at = Self::now_ms() + (delay_sec as i64 * 1000);

        let changed: i64 = redis::cmd("ZADD")
            .arg(PENDING_KEY)
            .arg("XX")
            .arg("CH")
            .arg(new_visible_at)
            .arg(receipt_handle)
            .query_async(&mut conn)
            .await?;

        if changed == 0 {
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }
        Ok(())
    }

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u64) -> Result<()> {
        self.nack(receipt_handle, seconds).await
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        let mut conn = self.conn.clone();
        let now = Self::now_ms();

        let visible: u64 = redis::cmd("ZCOUNT")
            .arg(PENDING_KEY)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;
        let total: u64 = redis::cmd("ZCARD").arg(PENDING_KEY).query_async(&mut conn).await?;

        Ok(QueueMetrics {
            visible,
            in_flight: total.saturating_sub(visible),
        })
    }
}
