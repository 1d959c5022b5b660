//! Autoscaler Configuration System
//!
//! TOML-based configuration with environment variable override support,
//! covering every key in spec section 6.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub redis: RedisConfig,
    pub locks: LockConfig,
    pub jobs: JobsConfig,
    pub ttl: TtlConfig,
    pub sanity: SanityConfig,
    pub cloud: CloudConfig,
    pub auth: AuthConfig,

    /// Path to the JSON document bootstrapping the initial group list
    /// (`{groupEntries: [...]}`). Missing file is fatal only if the path
    /// was explicitly configured; unset means "start with zero groups".
    pub group_config_file: Option<String>,

    /// Data directory for local storage (in-memory/dev store snapshots).
    pub data_dir: String,

    /// Enable development mode (in-memory store, permissive auth).
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            redis: RedisConfig::default(),
            locks: LockConfig::default(),
            jobs: JobsConfig::default(),
            ttl: TtlConfig::default(),
            sanity: SanityConfig::default(),
            cloud: CloudConfig::default(),
            auth: AuthConfig::default(),
            group_config_file: None,
            data_dir: "./data".to_string(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Redis connection configuration backing the Store and LockManager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub tls: bool,
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            tls: false,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Build a `redis://` (or `rediss://` when TLS) connection URL.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        match &self.password {
            Some(pw) if !pw.is_empty() => {
                format!("{scheme}://:{pw}@{}:{}/{}", self.host, self.port, self.db)
            }
            _ => format!("{scheme}://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Distributed lock TTLs (spec section 4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub group_lock_ttl_ms: u64,
    pub job_creation_lock_ttl_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            group_lock_ttl_ms: 180_000,
            job_creation_lock_ttl_ms: 30_000,
        }
    }
}

/// Job producer/worker tick cadence and grace periods (spec section 4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub group_jobs_creation_interval_sec: u64,
    pub sanity_jobs_creation_interval_sec: u64,
    pub group_jobs_creation_grace_period_sec: u64,
    pub sanity_jobs_creation_grace_period_sec: u64,
    /// Worker concurrency: how many group jobs a single replica processes
    /// at once.
    pub worker_concurrency: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            group_jobs_creation_interval_sec: 30,
            sanity_jobs_creation_interval_sec: 240,
            group_jobs_creation_grace_period_sec: 30,
            sanity_jobs_creation_grace_period_sec: 240,
            worker_concurrency: 10,
        }
    }
}

impl JobsConfig {
    /// Autoscale/Launch jobs time out together with the group lock they
    /// hold (spec section 4.7): `autoscalerProcessingTimeoutMs = groupLockTTL`.
    pub fn autoscaler_processing_timeout_ms(&self, locks: &LockConfig) -> u64 {
        locks.group_lock_ttl_ms
    }
}

/// TTLs for status, metric, shutdown, and audit keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub metric_ttl_sec: u64,
    pub idle_ttl_sec: u64,
    pub shutdown_ttl_sec: u64,
    pub audit_ttl_sec: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            metric_ttl_sec: 3600,
            idle_ttl_sec: 300,
            shutdown_ttl_sec: 86_400,
            audit_ttl_sec: 172_800,
        }
    }
}

/// Sanity loop drift ceiling (spec section 4.6 / open question in section 9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    pub max_throttle_threshold: u32,
    /// `sanityLoopProcessingTimeoutMs` (spec section 4.7) — Sanity jobs run
    /// under their own timeout rather than the group lock TTL, since a
    /// single Sanity job sweeps every group and has no group lock to race.
    pub sanity_loop_processing_timeout_ms: u64,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            max_throttle_threshold: 40,
            sanity_loop_processing_timeout_ms: 60_000,
        }
    }
}

/// Cloud provider credentials, one block per provider name in
/// `CLOUD_PROVIDERS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub providers: Vec<String>,
    pub oracle: OracleCredentials,
    pub digitalocean: DigitalOceanCredentials,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            providers: vec!["custom".to_string()],
            oracle: OracleCredentials::default(),
            digitalocean: DigitalOceanCredentials::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleCredentials {
    pub tenancy_ocid: String,
    pub user_ocid: String,
    pub fingerprint: String,
    pub private_key_path: String,
    pub region: String,
}

impl OracleCredentials {
    fn is_complete(&self) -> bool {
        !self.tenancy_ocid.is_empty()
            && !self.user_ocid.is_empty()
            && !self.fingerprint.is_empty()
            && !self.private_key_path.is_empty()
            && !self.region.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalOceanCredentials {
    pub api_token: String,
}

impl DigitalOceanCredentials {
    fn is_complete(&self) -> bool {
        !self.api_token.is_empty()
    }
}

impl CloudConfig {
    /// Every provider named in `providers` must have complete credentials,
    /// and `custom` needs none (spec section 7: "missing required config,
    /// e.g. cloud credentials for a declared provider" is fatal at startup).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in &self.providers {
            let complete = match provider.as_str() {
                "oracle" => self.oracle.is_complete(),
                "digitalocean" => self.digitalocean.is_complete(),
                "custom" => true,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "unknown cloud provider declared in CLOUD_PROVIDERS: {other}"
                    )))
                }
            };
            if !complete {
                return Err(ConfigError::ValidationError(format!(
                    "cloud provider '{provider}' is declared but missing required credentials"
                )));
            }
        }
        Ok(())
    }
}

/// Admin/sidecar HTTP surface authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `ProtectedApi` from spec section 6: when false, bearer verification
    /// is skipped (health is always open regardless).
    pub protected_api: bool,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            protected_api: true,
            jwt_issuer: "autoscaler".to_string(),
            jwt_audience: "autoscaler-sidecars".to_string(),
            jwt_secret: String::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Autoscaler Configuration
# Environment variables override these settings

[http]
port = 8080
host = "0.0.0.0"

[redis]
host = "127.0.0.1"
port = 6379
tls = false
db = 0

[locks]
group_lock_ttl_ms = 180000
job_creation_lock_ttl_ms = 30000

[jobs]
group_jobs_creation_interval_sec = 30
sanity_jobs_creation_interval_sec = 240
group_jobs_creation_grace_period_sec = 30
sanity_jobs_creation_grace_period_sec = 240
worker_concurrency = 10

[ttl]
metric_ttl_sec = 3600
idle_ttl_sec = 300
shutdown_ttl_sec = 86400
audit_ttl_sec = 172800

[sanity]
max_throttle_threshold = 40
sanity_loop_processing_timeout_ms = 60000

[cloud]
providers = ["oracle", "digitalocean"]

[cloud.oracle]
tenancy_ocid = ""
user_ocid = ""
fingerprint = ""
private_key_path = ""
region = ""

[cloud.digitalocean]
api_token = ""

[auth]
protected_api = true
jwt_issuer = "autoscaler"
jwt_audience = "autoscaler-sidecars"
jwt_secret = ""

group_config_file = ""
data_dir = "./data"
dev_mode = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.http.port, config.http.port);
        assert_eq!(parsed.locks.group_lock_ttl_ms, config.locks.group_lock_ttl_ms);
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let mut redis = RedisConfig::default();
        redis.password = Some("secret".to_string());
        assert_eq!(redis.url(), "redis://:secret@127.0.0.1:6379/0");
    }

    #[test]
    fn redis_url_omits_auth_when_unset() {
        let redis = RedisConfig::default();
        assert_eq!(redis.url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn cloud_validate_rejects_incomplete_declared_provider() {
        let mut cloud = CloudConfig::default();
        cloud.providers = vec!["oracle".to_string()];
        assert!(cloud.validate().is_err());
    }

    #[test]
    fn cloud_validate_accepts_complete_credentials() {
        let mut cloud = CloudConfig::default();
        cloud.providers = vec!["digitalocean".to_string()];
        cloud.digitalocean.api_token = "token".to_string();
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn cloud_validate_never_requires_credentials_for_custom() {
        let cloud = CloudConfig::default();
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn autoscaler_timeout_matches_group_lock_ttl() {
        let jobs = JobsConfig::default();
        let locks = LockConfig::default();
        assert_eq!(
            jobs.autoscaler_processing_timeout_ms(&locks),
            locks.group_lock_ttl_ms
        );
    }
}
