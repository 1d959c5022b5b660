//! Job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three job kinds the scheduler produces, one per background loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobType {
    /// Run `ProcessAutoscalingByGroup` for one group.
    Autoscale { group_name: String },
    /// Run `LaunchOrShutdownInstancesByGroup` for one group.
    Launch { group_name: String },
    /// Run `ReportUntrackedInstances` for one group.
    Sanity { group_name: String },
}

impl JobType {
    /// The group this job targets.
    pub fn group_name(&self) -> Option<&str> {
        match self {
            JobType::Autoscale { group_name }
            | JobType::Launch { group_name }
            | JobType::Sanity { group_name } => Some(group_name.as_str()),
        }
    }

    /// Dedup key suffix so two producer ticks for the same group/type
    /// within the grace window collapse into one queued job.
    pub fn dedupe_key(&self) -> String {
        match self {
            JobType::Autoscale { group_name } => format!("autoscale:{group_name}"),
            JobType::Launch { group_name } => format!("launch:{group_name}"),
            JobType::Sanity { group_name } => format!("sanity:{group_name}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub created_at: DateTime<Utc>,
    pub receive_count: u32,
}

impl Job {
    pub fn new(job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            created_at: Utc::now(),
            receive_count: 0,
        }
    }
}

/// A job handed to a worker, along with the receipt handle it must use to
/// ack/nack/extend.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: Job,
    pub receipt_handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanity_carries_its_group_name() {
        let s = JobType::Sanity { group_name: "jibri-eu".to_string() };
        assert_eq!(s.group_name(), Some("jibri-eu"));
    }

    #[test]
    fn autoscale_and_launch_dedupe_keys_do_not_collide() {
        let a = JobType::Autoscale { group_name: "jibri-eu".to_string() };
        let l = JobType::Launch { group_name: "jibri-eu".to_string() };
        assert_ne!(a.dedupe_key(), l.dedupe_key());
    }

    #[test]
    fn job_starts_with_zero_receive_count() {
        let job = Job::new(JobType::Sanity { group_name: "jibri-eu".to_string() });
        assert_eq!(job.receive_count, 0);
    }
}
