//! In-memory `CloudDriver` for `cloud: custom` groups and local
//! development: no SDK, no network call, just deterministic bookkeeping —
//! grounded on the same in-memory double shape as [`asc_store::MemoryStore`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::{CloudDriver, CloudInstance, LaunchResult, ProvisionStatus, Result};
use asc_common::InstanceGroup;

#[derive(Default)]
pub struct CustomDriver {
    instances: DashMap<String, Vec<CloudInstance>>,
}

impl CustomDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CloudDriver for CustomDriver {
    async fn launch(&self, group: &InstanceGroup, count: u32) -> Result<Vec<LaunchResult>> {
        let mut launched = Vec::with_capacity(count as usize);
        let mut entry = self.instances.entry(group.name.clone()).or_default();
        for _ in 0..count {
            let instance_id = format!("custom-{}", Uuid::new_v4());
            entry.push(CloudInstance {
                instance_id: instance_id.clone(),
                region: group.region.clone(),
                status: ProvisionStatus::Running,
            });
            launched.push(LaunchResult {
                instance_id,
                status: ProvisionStatus::Running,
            });
        }
        Ok(launched)
    }

    async fn list_instances(&self, group: &InstanceGroup) -> Result<Vec<CloudInstance>> {
        Ok(self
            .instances
            .get(&group.name)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_common::{Cloud, GroupType, ScalingOptions};

    fn group() -> InstanceGroup {
        InstanceGroup {
            name: "jibri-eu".to_string(),
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

    #[tokio::test]
    async fn launched_instances_show_up_in_list() {
        let driver = CustomDriver::new();
        driver.launch(&group(), 3).await.unwrap();
        let listed = driver.list_instances(&group()).await.unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn unknown_group_has_empty_inventory() {
        let driver = CustomDriver::new();
        assert!(driver.list_instances(&group()).await.unwrap().is_empty());
    }
}
