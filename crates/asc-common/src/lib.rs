//! Shared data model for the autoscaling controller.
//!
//! Mirrors the `InstanceGroup` / `InstanceStatus` / `MetricSample` /
//! `AuditEntry` shapes described by the store key layout so every crate in
//! the workspace agrees on wire-compatible field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod keys;
pub mod logging;
pub mod strategy;

pub use strategy::{GroupType, WorkloadStrategy};

// ============================================================================
// Group definition
// ============================================================================

/// Cloud provider an instance group is provisioned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Oracle,
    Digitalocean,
    Custom,
}

/// Per-group scaling policy: thresholds, hysteresis window, and bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ScalingOptions {
    pub min_desired: u32,
    pub max_desired: u32,
    pub desired_count: u32,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_quantity: u32,
    pub scale_down_quantity: u32,
    pub scale_up_periods_count: u32,
    pub scale_down_periods_count: u32,
    pub scale_period_sec: u64,
}

impl ScalingOptions {
    /// `min ≤ desired ≤ max` and all positive-quantity fields are non-zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_desired > self.max_desired {
            return Err(format!(
                "minDesired ({}) must be <= maxDesired ({})",
                self.min_desired, self.max_desired
            ));
        }
        if self.desired_count < self.min_desired || self.desired_count > self.max_desired {
            return Err(format!(
                "desiredCount ({}) must be within [{}, {}]",
                self.desired_count, self.min_desired, self.max_desired
            ));
        }
        if self.scale_up_quantity == 0 || self.scale_down_quantity == 0 {
            return Err("scaleUpQuantity and scaleDownQuantity must be positive".to_string());
        }
        if self.scale_up_periods_count == 0 || self.scale_down_periods_count == 0 {
            return Err(
                "scaleUpPeriodsCount and scaleDownPeriodsCount must be positive".to_string(),
            );
        }
        Ok(())
    }

    /// Clamp a proposed desired count into `[min_desired, max_desired]`.
    pub fn clamp(&self, value: i64) -> u32 {
        value.clamp(self.min_desired as i64, self.max_desired as i64) as u32
    }
}

/// A named logical pool of identically-configured worker instances in one
/// region/cloud. `desiredCount` is the only field the autoscaler itself
/// mutates; everything else is admin-owned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub region: String,
    pub cloud: Cloud,
    pub instance_configuration_id: String,
    pub compartment_id: String,
    pub enable_auto_scale: bool,
    #[serde(default)]
    pub protected_ttl_sec: Option<u64>,
    pub scaling_options: ScalingOptions,
}

impl InstanceGroup {
    pub fn validate(&self) -> Result<(), String> {
        self.scaling_options.validate()
    }
}

// ============================================================================
// Instance status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BusyStatus {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// Type-specific status payload. Jibri reports busy/health; JVB (and any
/// future workload) just needs a presence heartbeat, with its stress metric
/// carried separately as a `MetricSample`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum WorkloadStatus {
    Jibri {
        busy_status: BusyStatus,
        health: Health,
    },
    Jvb,
}

/// Keyed `(groupName, instanceId)`. TTL = `idleTTL`, refreshed on every
/// sidecar heartbeat; absence means the instance is considered gone.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceStatus {
    pub group_name: String,
    pub instance_id: String,
    pub instance_type: GroupType,
    pub region: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    pub status: WorkloadStatus,
}

impl InstanceStatus {
    /// Whether the launcher may pick this instance as a shutdown victim
    /// based purely on its reported status (protection is checked
    /// separately by the caller).
    pub fn available_for_termination(&self) -> bool {
        match &self.status {
            WorkloadStatus::Jibri { busy_status, .. } => *busy_status == BusyStatus::Idle,
            WorkloadStatus::Jvb => true,
        }
    }
}

// ============================================================================
// Metric samples
// ============================================================================

/// Keyed `(groupName, instanceId, timestamp)`. `value` semantics depend on
/// group type: for jibri, `1.0` if idle else `0.0`; for JVB, a stress level
/// in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct MetricSample {
    pub timestamp_ms: i64,
    pub value: f64,
}

// ============================================================================
// Audit trail
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    IncreaseDesiredCount,
    DecreaseDesiredCount,
    Launch,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    pub count: u32,
    pub old_desired_count: u32,
    pub new_desired_count: u32,
    #[serde(default)]
    pub scale_metrics: Vec<f64>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AutoscalerError {
    #[error("store error: {0}")]
    Store(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("cloud provider error: {0}")]
    Cloud(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("group has active instances: {0}")]
    GroupHasActiveInstances(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AutoscalerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ScalingOptions {
        ScalingOptions {
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
        }
    }

    #[test]
    fn validate_rejects_min_above_max() {
        let mut o = opts();
        o.min_desired = 6;
        assert!(o.validate().is_err());
    }

    #[test]
    fn validate_rejects_desired_out_of_bounds() {
        let mut o = opts();
        o.desired_count = 10;
        assert!(o.validate().is_err());
    }

    #[test]
    fn clamp_stays_within_bounds() {
        let o = opts();
        assert_eq!(o.clamp(-5), 1);
        assert_eq!(o.clamp(100), 5);
        assert_eq!(o.clamp(3), 3);
    }
}
