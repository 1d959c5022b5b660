//! Wire types for the admin/sidecar HTTP surface (spec section 6).
//!
//! These are the RPC boundary the spec treats as an external collaborator:
//! the core only needs the shapes, not the webhook/auth plumbing around
//! them, so this module stays small and serde-derived rather than pulling
//! in a full request-validation framework.

use asc_common::{AuditEntry, BusyStatus, GroupType, Health, InstanceGroup, InstanceStatus, WorkloadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `POST /hook/v1/status` body. Modeled only far enough to validate the two
/// required fields the spec calls out — this endpoint is an external
/// collaborator's webhook, not part of the autoscaling core.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JibriState {
    pub status: Option<String>,
    pub jibri_id: Option<String>,
}

impl JibriState {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.status.is_none() {
            errors.push("status is required".to_string());
        }
        if self.jibri_id.is_none() {
            errors.push("jibriId is required".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `POST /sidecar/poll` body — just enough to identify the instance asking
/// whether it should shut down.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    pub group_name: String,
    pub instance_id: String,
}

/// `POST /sidecar/stats` and `/sidecar/status` body: a heartbeat carrying
/// both the type-specific status payload and the raw metric value (spec
/// section 3's `MetricSample.value` semantics: 1/0 idle flag for jibri, a
/// stress level in `[0, 1]` for JVB).
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub group_name: String,
    pub instance_id: String,
    pub instance_type: GroupType,
    pub region: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub busy_status: Option<BusyStatus>,
    #[serde(default)]
    pub health: Option<Health>,
    pub value: f64,
}

impl StatsReport {
    /// Build the `(InstanceStatus, metric value)` pair `InstanceTracker::track`
    /// expects. Jibri reports require `busyStatus`/`health`; JVB ignores
    /// them and the stress level travels as `value` alone.
    pub fn into_status_and_value(self) -> Result<(InstanceStatus, f64), Vec<String>> {
        let status = match self.instance_type {
            GroupType::Jibri => {
                let busy_status = self.busy_status.ok_or_else(|| vec!["busyStatus is required for jibri".to_string()])?;
                let health = self.health.ok_or_else(|| vec!["health is required for jibri".to_string()])?;
                WorkloadStatus::Jibri { busy_status, health }
            }
            GroupType::Jvb => WorkloadStatus::Jvb,
        };
        Ok((
            InstanceStatus {
                group_name: self.group_name,
                instance_id: self.instance_id,
                instance_type: self.instance_type,
                region: self.region,
                public_ip: self.public_ip,
                private_ip: self.private_ip,
                status,
            },
            self.value,
        ))
    }
}

/// Response shared by `/sidecar/poll` and `/sidecar/status`. `reconfigure`
/// is always `false` (spec section 9 open question) — carried only for
/// wire compatibility with existing sidecar deployments.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ShutdownPollResponse {
    pub shutdown: bool,
    pub reconfigure: bool,
}

impl From<asc_shutdown::ShutdownStatus> for ShutdownPollResponse {
    fn from(s: asc_shutdown::ShutdownStatus) -> Self {
        Self { shutdown: s.shutdown, reconfigure: s.reconfigure }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaveResponse {
    pub save: &'static str,
}

impl Default for SaveResponse {
    fn default() -> Self {
        Self { save: "OK" }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupsResponse {
    pub instance_groups: Vec<InstanceGroup>,
}

/// `PUT /groups/:name/desired-count` body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DesiredCountRequest {
    pub desired_count: u32,
}

/// `POST /groups/:name/actions/launch-protected` body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaunchProtectedRequest {
    pub count: u32,
    pub scale_down_protected_ttl_sec: u64,
    #[serde(default)]
    pub instance_configuration_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaunchProtectedResponse {
    pub launched_instance_ids: Vec<String>,
    pub new_desired_count: u32,
}

/// `GET /groups/:name/report` response: the group definition composed with
/// audit history, run timestamps, and the tracked/cloud inventory counts
/// the sanity loop would otherwise only log (spec section 4.8).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub group: InstanceGroup,
    pub tracked_instance_count: usize,
    /// `None` when the cloud provider call failed — a transient error per
    /// spec section 7, not a reason to fail the whole report.
    pub cloud_instance_count: Option<usize>,
    pub last_autoscaler_run: Option<DateTime<Utc>>,
    pub last_launcher_run: Option<DateTime<Utc>>,
    pub audit_entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}
