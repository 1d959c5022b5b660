//! Oracle Cloud Infrastructure driver.
//!
//! Launches instances via the Compute Management `instancePools` /
//! `launchInstance`-style REST surface and enumerates them by
//! `compartmentId` + `instanceConfigurationId`. Requests are plain
//! `reqwest` JSON calls rather than a full OCI signing SDK — the spec
//! treats `CloudDriver` as an interface boundary (section 1's "out of
//! scope" list), so this is a thin, retryable HTTP client rather than a
//! complete OCI integration.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CloudError;
use crate::retry::{is_retryable_status, with_retry, RetryConfig};
use crate::{CloudDriver, CloudInstance, LaunchResult, ProvisionStatus, Result};
use asc_common::InstanceGroup;
use asc_config::OracleCredentials;

const DEFAULT_BASE_URL: &str = "https://iaas.{region}.oraclecloud.com/20160918";

#[derive(Serialize)]
struct LaunchInstanceRequest<'a> {
    #[serde(rename = "compartmentId")]
    compartment_id: &'a str,
    #[serde(rename = "instanceConfigurationId")]
    instance_configuration_id: &'a str,
    #[serde(rename = "availabilityDomain")]
    availability_domain: Option<&'a str>,
}

#[derive(Deserialize)]
struct LaunchInstanceResponse {
    id: String,
    #[serde(default)]
    #[serde(rename = "lifecycleState")]
    lifecycle_state: String,
}

#[derive(Deserialize)]
struct ListInstancesResponse {
    #[serde(default)]
    items: Vec<OciInstance>,
}

#[derive(Deserialize)]
struct OciInstance {
    id: String,
    #[serde(rename = "lifecycleState")]
    lifecycle_state: String,
    region: String,
}

fn parse_state(state: &str) -> ProvisionStatus {
    match state {
        "RUNNING" => ProvisionStatus::Running,
        "TERMINATED" | "TERMINATING" => ProvisionStatus::Terminated,
        _ => ProvisionStatus::Provisioning,
    }
}

pub struct OracleDriver {
    client: Client,
    credentials: OracleCredentials,
    retry: RetryConfig,
}

impl OracleDriver {
    pub fn new(credentials: OracleCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            retry: RetryConfig::default(),
        }
    }

    fn base_url(&self, group: &InstanceGroup) -> String {
        let region = if self.credentials.region.is_empty() {
            group.region.as_str()
        } else {
            self.credentials.region.as_str()
        };
        DEFAULT_BASE_URL.replace("{region}", region)
    }

    async fn launch_one(&self, group: &InstanceGroup) -> Result<LaunchResult> {
        let url = format!("{}/instances", self.base_url(group));
        let body = LaunchInstanceRequest {
            compartment_id: &group.compartment_id,
            instance_configuration_id: &group.instance_configuration_id,
            availability_domain: None,
        };

        let response = with_retry(
            &self.retry,
            |e: &CloudError| matches!(e, CloudError::ProviderError { status, .. } if is_retryable_status(*status)),
            || async {
                let resp = self.client.post(&url).json(&body).send().await?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(CloudError::ProviderError { status, body: text });
                }
                Ok(resp.json::<LaunchInstanceResponse>().await?)
            },
        )
        .await?;

        debug!(instance_id = %response.id, "oracle instance launch accepted");
        Ok(LaunchResult {
            instance_id: response.id,
            status: parse_state(&response.lifecycle_state),
        })
    }
}

#[async_trait]
impl CloudDriver for OracleDriver {
    async fn launch(&self, group: &InstanceGroup, count: u32) -> Result<Vec<LaunchResult>> {
        if self.credentials.tenancy_ocid.is_empty() {
            return Err(CloudError::MissingCredentials("oracle".to_string()));
        }

        let mut launched = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match self.launch_one(group).await {
                Ok(result) => launched.push(result),
                Err(e) => {
                    warn!(error = %e, group = %group.name, "oracle launch failed, returning partial batch");
                    break;
                }
            }
        }
        Ok(launched)
    }

    async fn list_instances(&self, group: &InstanceGroup) -> Result<Vec<CloudInstance>> {
        if self.credentials.tenancy_ocid.is_empty() {
            return Err(CloudError::MissingCredentials("oracle".to_string()));
        }

        let url = format!(
            "{}/instances?compartmentId={}",
            self.base_url(group),
            group.compartment_id
        );
        let response = with_retry(
            &self.retry,
            |e: &CloudError| matches!(e, CloudError::ProviderError { status, .. } if is_retryable_status(*status)),
            || async {
                let resp = self.client.get(&url).send().await?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(CloudError::ProviderError { status, body: text });
                }
                Ok(resp.json::<ListInstancesResponse>().await?)
            },
        )
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|i| CloudInstance {
                instance_id: i.id,
                region: i.region,
                status: parse_state(&i.lifecycle_state),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_lifecycle_states() {
        assert_eq!(parse_state("RUNNING"), ProvisionStatus::Running);
        assert_eq!(parse_state("TERMINATED"), ProvisionStatus::Terminated);
        assert_eq!(parse_state("PROVISIONING"), ProvisionStatus::Provisioning);
        assert_eq!(parse_state("STOPPING"), ProvisionStatus::Provisioning);
    }
}
