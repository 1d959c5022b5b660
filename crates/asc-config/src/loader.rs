//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "autoscaler.toml",
    "./config/config.toml",
    "./config/autoscaler.toml",
    "/etc/autoscaler/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("AUTOSCALER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides, following the key names in
    /// spec section 6.
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("HTTP_HOST") {
            config.http.host = val;
        }

        // Redis
        if let Ok(val) = env::var("REDIS_HOST") {
            config.redis.host = val;
        }
        if let Ok(val) = env::var("REDIS_PORT") {
            if let Ok(port) = val.parse() {
                config.redis.port = port;
            }
        }
        if let Ok(val) = env::var("REDIS_PASSWORD") {
            config.redis.password = Some(val);
        }
        if let Ok(val) = env::var("REDIS_TLS") {
            config.redis.tls = val.parse().unwrap_or(false);
        }
        if let Ok(val) = env::var("REDIS_DB") {
            if let Ok(db) = val.parse() {
                config.redis.db = db;
            }
        }

        // Locks
        if let Ok(val) = env::var("GROUP_LOCK_TTL_MS") {
            if let Ok(ttl) = val.parse() {
                config.locks.group_lock_ttl_ms = ttl;
            }
        }
        if let Ok(val) = env::var("JOBS_CREATION_LOCK_TTL_MS") {
            if let Ok(ttl) = val.parse() {
                config.locks.job_creation_lock_ttl_ms = ttl;
            }
        }

        // Jobs
        if let Ok(val) = env::var("GROUP_JOBS_CREATION_INTERVAL_SEC") {
            if let Ok(v) = val.parse() {
                config.jobs.group_jobs_creation_interval_sec = v;
            }
        }
        if let Ok(val) = env::var("SANITY_JOBS_CREATION_INTERVAL_SEC") {
            if let Ok(v) = val.parse() {
                config.jobs.sanity_jobs_creation_interval_sec = v;
            }
        }
        if let Ok(val) = env::var("WORKER_CONCURRENCY") {
            if let Ok(v) = val.parse() {
                config.jobs.worker_concurrency = v;
            }
        }

        // TTLs
        if let Ok(val) = env::var("METRIC_TTL_SEC") {
            if let Ok(v) = val.parse() {
                config.ttl.metric_ttl_sec = v;
            }
        }
        if let Ok(val) = env::var("IDLE_TTL_SEC") {
            if let Ok(v) = val.parse() {
                config.ttl.idle_ttl_sec = v;
            }
        }
        if let Ok(val) = env::var("SHUTDOWN_TTL_SEC") {
            if let Ok(v) = val.parse() {
                config.ttl.shutdown_ttl_sec = v;
            }
        }
        if let Ok(val) = env::var("AUDIT_TTL_SEC") {
            if let Ok(v) = val.parse() {
                config.ttl.audit_ttl_sec = v;
            }
        }

        // Sanity
        if let Ok(val) = env::var("MAX_THROTTLE_THRESHOLD") {
            if let Ok(v) = val.parse() {
                config.sanity.max_throttle_threshold = v;
            }
        }
        if let Ok(val) = env::var("SANITY_LOOP_PROCESSING_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                config.sanity.sanity_loop_processing_timeout_ms = v;
            }
        }

        // Cloud
        if let Ok(val) = env::var("CLOUD_PROVIDERS") {
            config.cloud.providers = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = env::var("ORACLE_TENANCY_OCID") {
            config.cloud.oracle.tenancy_ocid = val;
        }
        if let Ok(val) = env::var("ORACLE_USER_OCID") {
            config.cloud.oracle.user_ocid = val;
        }
        if let Ok(val) = env::var("ORACLE_FINGERPRINT") {
            config.cloud.oracle.fingerprint = val;
        }
        if let Ok(val) = env::var("ORACLE_PRIVATE_KEY_PATH") {
            config.cloud.oracle.private_key_path = val;
        }
        if let Ok(val) = env::var("ORACLE_REGION") {
            config.cloud.oracle.region = val;
        }
        if let Ok(val) = env::var("DIGITALOCEAN_API_TOKEN") {
            config.cloud.digitalocean.api_token = val;
        }

        // Auth
        if let Ok(val) = env::var("PROTECTED_API") {
            config.auth.protected_api = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("JWT_ISSUER") {
            config.auth.jwt_issuer = val;
        }
        if let Ok(val) = env::var("JWT_AUDIENCE") {
            config.auth.jwt_audience = val;
        }
        if let Ok(val) = env::var("JWT_SECRET") {
            config.auth.jwt_secret = val;
        }

        // General
        if let Ok(val) = env::var("GROUP_CONFIG_FILE") {
            config.group_config_file = Some(val);
        }
        if let Ok(val) = env::var("DATA_DIR") {
            config.data_dir = val;
        }
        if let Ok(val) = env::var("DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_explicit_path_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, AppConfig::example_toml()).unwrap();
        let loader = ConfigLoader::with_path(&path);
        assert_eq!(loader.find_config_file(), Some(path));
    }

    #[test]
    fn missing_explicit_path_falls_back_to_none() {
        let loader = ConfigLoader::with_path("/nonexistent/path/config.toml");
        assert!(loader.find_config_file().is_none());
    }
}
