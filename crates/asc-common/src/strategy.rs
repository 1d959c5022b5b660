//! Per-workload strategy objects.
//!
//! `GroupType` is a tagged enum instead of a trait object so the decision
//! tables in spec section 4.3 stay exhaustive and match-checked by the
//! compiler; adding a new workload is one new variant plus one new arm in
//! each method below, per the design notes' "strategy object" guidance.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{InstanceStatus, ScalingOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Jibri,
    #[serde(rename = "JVB")]
    Jvb,
}

/// A strategy bundle for one workload type: how to summarize a metric
/// bucket, whether a summarized bucket satisfies the up/down predicate, and
/// how to rank instances for shutdown-victim selection.
pub trait WorkloadStrategy {
    /// Summary value for a bucket of samples. An empty bucket still needs a
    /// neutral value so `EvalAllPeriods` has something to compare against.
    fn summarize(&self, values: &[f64]) -> f64;

    /// True if this bucket's summary counts towards a scale-up decision.
    fn up_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool;

    /// True if this bucket's summary counts towards a scale-down decision.
    fn down_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool;

    /// Lower is a better shutdown candidate. Used as the primary sort key
    /// before the lexicographic `instanceId` tie-break.
    fn victim_priority(&self, status: &InstanceStatus) -> u8;

    /// Secondary sort key within a priority tier: for JVB this is the
    /// instance's latest reported stress level (lowest first); jibri has no
    /// secondary ranking beyond busy/idle, so it's constant. `None` means no
    /// metric sample was found for the instance yet, ranked as the least
    /// preferable victim in its tier.
    fn victim_metric_key(&self, metric_value: Option<f64>) -> f64;
}

struct JibriStrategy;
struct JvbStrategy;

impl WorkloadStrategy for JibriStrategy {
    fn summarize(&self, values: &[f64]) -> f64 {
        // Count of idle heartbeats in the period.
        values.iter().sum()
    }

    fn up_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        (count < opts.max_desired && summary < opts.scale_up_threshold) || count < opts.min_desired
    }

    fn down_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        count > opts.min_desired && summary > opts.scale_down_threshold
    }

    fn victim_priority(&self, status: &InstanceStatus) -> u8 {
        if status.available_for_termination() {
            0
        } else {
            1
        }
    }

    fn victim_metric_key(&self, _metric_value: Option<f64>) -> f64 {
        0.0
    }
}

impl WorkloadStrategy for JvbStrategy {
    fn summarize(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn up_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        (count < opts.max_desired && summary >= opts.scale_up_threshold) || count < opts.min_desired
    }

    fn down_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        count > opts.min_desired && summary < opts.scale_down_threshold
    }

    fn victim_priority(&self, _status: &InstanceStatus) -> u8 {
        // JVB has no idle/busy split; every instance is an eligible victim
        // tier, ranked instead by `victim_metric_key`.
        0
    }

    fn victim_metric_key(&self, metric_value: Option<f64>) -> f64 {
        // Lowest stress first (spec section 4.4 step 4); an instance with no
        // recorded sample yet is the least preferable victim in its tier.
        metric_value.unwrap_or(f64::MAX)
    }
}

impl GroupType {
    /// The empty-bucket summary is type-specific: `0` for jibri (no idle
    /// heartbeats observed), `scaleUpThreshold` (neutral) for JVB — see
    /// spec section 4.2.
    pub fn empty_bucket_summary(&self, opts: &ScalingOptions) -> f64 {
        match self {
            GroupType::Jibri => 0.0,
            GroupType::Jvb => opts.scale_up_threshold,
        }
    }

    fn strategy(&self) -> &'static dyn WorkloadStrategy {
        match self {
            GroupType::Jibri => &JibriStrategy,
            GroupType::Jvb => &JvbStrategy,
        }
    }

    pub fn summarize(&self, values: &[f64]) -> f64 {
        self.strategy().summarize(values)
    }

    pub fn up_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        self.strategy().up_predicate(summary, count, opts)
    }

    pub fn down_predicate(&self, summary: f64, count: u32, opts: &ScalingOptions) -> bool {
        self.strategy().down_predicate(summary, count, opts)
    }

    pub fn victim_priority(&self, status: &InstanceStatus) -> u8 {
        self.strategy().victim_priority(status)
    }

    pub fn victim_metric_key(&self, metric_value: Option<f64>) -> f64 {
        self.strategy().victim_metric_key(metric_value)
    }
}

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
    fn jibri_summarize_counts_idle_samples() {
        assert_eq!(GroupType::Jibri.summarize(&[1.0, 0.0, 1.0]), 2.0);
    }

    #[test]
    fn jibri_up_predicate_triggers_below_threshold() {
        let o = opts();
        assert!(GroupType::Jibri.up_predicate(0.0, 2, &o));
        assert!(!GroupType::Jibri.up_predicate(2.0, 2, &o));
    }

    #[test]
    fn jibri_up_predicate_triggers_under_min_regardless_of_summary() {
        let o = opts();
        assert!(GroupType::Jibri.up_predicate(5.0, 0, &o));
    }

    #[test]
    fn jvb_summarize_is_mean() {
        assert!((GroupType::Jvb.summarize(&[0.1, 0.2, 0.3]) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn jvb_down_predicate_below_threshold() {
        let o = opts();
        assert!(GroupType::Jvb.down_predicate(0.1, 6, &o));
        assert!(!GroupType::Jvb.down_predicate(0.5, 6, &o));
    }

    #[test]
    fn empty_bucket_summary_differs_by_type() {
        let o = opts();
        assert_eq!(GroupType::Jibri.empty_bucket_summary(&o), 0.0);
        assert_eq!(GroupType::Jvb.empty_bucket_summary(&o), o.scale_up_threshold);
    }

    #[test]
    fn jvb_victim_metric_key_prefers_lowest_stress() {
        assert!(GroupType::Jvb.victim_metric_key(Some(0.1)) < GroupType::Jvb.victim_metric_key(Some(0.9)));
        assert_eq!(GroupType::Jvb.victim_metric_key(None), f64::MAX);
    }

    #[test]
    fn jibri_victim_metric_key_is_constant() {
        assert_eq!(GroupType::Jibri.victim_metric_key(Some(0.1)), GroupType::Jibri.victim_metric_key(None));
    }
}
