//! `CloudDriver` capability: launch N instances in a
//! group's region, enumerate cloud-side inventory, modeled uniformly
//! across providers so the launcher and sanity loop never branch on
//! `group.cloud` themselves — they call through the trait and the
//! registry in this crate picks the implementation.

pub mod custom;
pub mod digitalocean;
pub mod error;
pub mod oracle;
pub mod retry;

pub use error::{CloudError, Result};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use asc_common::{Cloud, InstanceGroup};
use serde::{Deserialize, Serialize};

/// Coarse provisioning state the sanity loop and launcher key off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionStatus {
    Provisioning,
    Running,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResult {
    pub instance_id: String,
    pub status: ProvisionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudInstance {
    pub instance_id: String,
    pub region: String,
    pub status: ProvisionStatus,
}

/// Uniform capability every provider backend implements.
#[async_trait]
pub trait CloudDriver: Send + Sync {
    /// Launch `count` instances for `group` in its configured region.
    /// Returns one `LaunchResult` per instance the provider accepted —
    /// callers should not assume `count` results on a partial failure.
    async fn launch(&self, group: &InstanceGroup, count: u32) -> Result<Vec<LaunchResult>>;

    /// Enumerate every cloud-side instance belonging to `group`, used only
    /// by the sanity loop to detect drift — never mutates state.
    async fn list_instances(&self, group: &InstanceGroup) -> Result<Vec<CloudInstance>>;
}

/// Picks the right `CloudDriver` by `group.cloud`, built once at startup
/// from `CloudConfig`.
pub struct CloudDriverRegistry {
    drivers: HashMap<Cloud, Arc<dyn CloudDriver>>,
}

impl CloudDriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn with_driver(mut self, cloud: Cloud, driver: Arc<dyn CloudDriver>) -> Self {
        self.drivers.insert(cloud, driver);
        self
    }

    pub fn get(&self, cloud: Cloud) -> Result<Arc<dyn CloudDriver>> {
        self.drivers
            .get(&cloud)
            .cloned()
            .ok_or(CloudError::Unsupported(cloud))
    }
}

impl Default for CloudDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::CustomDriver;
    use asc_common::{Cloud, GroupType, InstanceGroup, ScalingOptions};

    fn group() -> InstanceGroup {
        InstanceGroup {
            name: "jibri-eu".to_string(),
            group_type: GroupType::Jibri,
            region: "eu-central-1".to_string(),
            cloud: Cloud::Custom,
            instance_configuration_id: "cfg-1".to_string(),
            compartment_id: "compartment-1".to_string(),
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

    #[tokio::test]
    async fn registry_dispatches_by_cloud_field() {
        let registry = CloudDriverRegistry::new().with_driver(Cloud::Custom, Arc::new(CustomDriver::new()));
        let driver = registry.get(Cloud::Custom).unwrap();
        let launched = driver.launch(&group(), 2).await.unwrap();
        assert_eq!(launched.len(), 2);
    }

    #[test]
    fn registry_reports_unsupported_cloud() {
        let registry = CloudDriverRegistry::new();
        assert!(registry.get(Cloud::Oracle).is_err());
    }
}
