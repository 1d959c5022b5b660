//! DigitalOcean driver, built against the public Droplets REST API
//! (`POST /v2/droplets`, `GET /v2/droplets?tag_name=<group>`). Tagging
//! every droplet with the group name is how `list_instances` finds its
//! inventory without a separate index.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CloudError;
use crate::retry::{is_retryable_status, with_retry, RetryConfig};
use crate::{CloudDriver, CloudInstance, LaunchResult, ProvisionStatus, Result};
use asc_common::InstanceGroup;
use asc_config::DigitalOceanCredentials;

const BASE_URL: &str = "https://api.digitalocean.com/v2";

#[derive(Serialize)]
struct CreateDropletRequest<'a> {
    name: String,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct CreateDropletResponse {
    droplet: Droplet,
}

#[derive(Deserialize)]
struct ListDropletsResponse {
    #[serde(default)]
    droplets: Vec<Droplet>,
}

#[derive(Deserialize)]
struct Droplet {
    id: u64,
    status: String,
    region: DropletRegion,
}

#[derive(Deserialize)]
struct DropletRegion {
    slug: String,
}

fn parse_status(status: &str) -> ProvisionStatus {
    match status {
        "active" => ProvisionStatus::Running,
        "archive" => ProvisionStatus::Terminated,
        _ => ProvisionStatus::Provisioning,
    }
}

pub struct DigitalOceanDriver {
    client: Client,
    credentials: DigitalOceanCredentials,
    retry: RetryConfig,
}

impl DigitalOceanDriver {
    pub fn new(credentials: DigitalOceanCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            retry: RetryConfig::default(),
        }
    }

    /// `InstanceConfigurationId` is reused as `size/image` joined by a
    /// comma (e.g. `s-2vcpu-4gb,jibri-base`) since DigitalOcean has no
    /// single "launch template" resource the way Oracle does.
    fn size_and_image(group: &InstanceGroup) -> (&str, &str) {
        group
            .instance_configuration_id
            .split_once(',')
            .unwrap_or((group.instance_configuration_id.as_str(), "ubuntu-22-04-x64"))
    }
}

#[async_trait]
impl CloudDriver for DigitalOceanDriver {
    async fn launch(&self, group: &InstanceGroup, count: u32) -> Result<Vec<LaunchResult>> {
        if self.credentials.api_token.is_empty() {
            return Err(CloudError::MissingCredentials("digitalocean".to_string()));
        }

        let (size, image) = Self::size_and_image(group);
        let mut launched = Vec::with_capacity(count as usize);

        for i in 0..count {
            let body = CreateDropletRequest {
                name: format!("{}-{}", group.name, uuid::Uuid::new_v4()),
                region: &group.region,
                size,
                image,
                tags: vec![group.name.clone()],
            };
            let url = format!("{BASE_URL}/droplets");

            let result = with_retry(
                &self.retry,
                |e: &CloudError| matches!(e, CloudError::ProviderError { status, .. } if is_retryable_status(*status)),
                || async {
                    let resp = self
                        .client
                        .post(&url)
                        .bearer_auth(&self.credentials.api_token)
                        .json(&body)
                        .send()
                        .await?;
                    if !resp.status().is_success() {
                        let status = resp.status().as_u16();
                        let text = resp.text().await.unwrap_or_default();
                        return Err(CloudError::ProviderError { status, body: text });
                    }
                    Ok(resp.json::<CreateDropletResponse>().await?)
                },
            )
            .await;

            match result {
                Ok(resp) => {
                    debug!(droplet_id = resp.droplet.id, "digitalocean droplet created");
                    launched.push(LaunchResult {
                        instance_id: resp.droplet.id.to_string(),
                        status: parse_status(&resp.droplet.status),
                    });
                }
                Err(e) => {
                    warn!(error = %e, group = %group.name, requested = count, launched = i, "digitalocean launch failed, returning partial batch");
                    break;
                }
            }
        }

        Ok(launched)
    }

    async fn list_instances(&self, group: &InstanceGroup) -> Result<Vec<CloudInstance>> {
        if self.credentials.api_token.is_empty() {
            return Err(CloudError::MissingCredentials("digitalocean".to_string()));
        }

        let url = format!("{BASE_URL}/droplets?tag_name={}", group.name);
        let response = with_retry(
            &self.retry,
            |e: &CloudError| matches!(e, CloudError::ProviderError { status, .. } if is_retryable_status(*status)),
            || async {
                let resp = self.client.get(&url).bearer_auth(&self.credentials.api_token).send().await?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(CloudError::ProviderError { status, body: text });
                }
                Ok(resp.json::<ListDropletsResponse>().await?)
            },
        )
        .await?;

        Ok(response
            .droplets
            .into_iter()
            .map(|d| CloudInstance {
                instance_id: d.id.to_string(),
                region: d.region.slug,
                status: parse_status(&d.status),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_common::{Cloud, GroupType, ScalingOptions};

    fn group(config_id: &str) -> InstanceGroup {
        InstanceGroup {
            name: "jibri-eu".to_string(),
            group_type: GroupType::Jibri,
            region: "fra1".to_string(),
            cloud: Cloud::Digitalocean,
            instance_configuration_id: config_id.to_string(),
            compartment_id: String::new(),
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

    #[test]
    fn size_and_image_splits_on_comma() {
        let g = group("s-2vcpu-4gb,jibri-base");
        assert_eq!(DigitalOceanDriver::size_and_image(&g), ("s-2vcpu-4gb", "jibri-base"));
    }

    #[test]
    fn size_and_image_falls_back_to_default_image() {
        let g = group("s-2vcpu-4gb");
        assert_eq!(DigitalOceanDriver::size_and_image(&g), ("s-2vcpu-4gb", "ubuntu-22-04-x64"));
    }

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_status("active"), ProvisionStatus::Running);
        assert_eq!(parse_status("archive"), ProvisionStatus::Terminated);
        assert_eq!(parse_status("new"), ProvisionStatus::Provisioning);
    }

    #[tokio::test]
    async fn launch_without_token_is_a_missing_credentials_error() {
        let driver = DigitalOceanDriver::new(DigitalOceanCredentials::default());
        let err = driver.launch(&group("s-2vcpu-4gb"), 1).await.unwrap_err();
        assert!(matches!(err, CloudError::MissingCredentials(_)));
    }
}
