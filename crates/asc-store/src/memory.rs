//! In-memory `Store` for unit tests and `DEV_MODE` deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Result, Store};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map(|at| at > Instant::now()).unwrap_or(true)
    }
}

/// Thread-safe in-memory store. Expired entries are reaped lazily on
/// access, same as the Redis backend leaves expiry to the server.
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_sec.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<bool> {
        if let Some(existing) = self.data.get(key) {
            if existing.is_live() {
                return Ok(false);
            }
        }
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_sec.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.data.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let now_live_keys: Vec<String> = self
            .data
            .iter()
            .filter(|kv| kv.key().starts_with(prefix) && kv.value().is_live())
            .map(|kv| kv.key().clone())
            .collect();
        Ok(now_live_keys)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_sec: u64) -> Result<()> {
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_sec));
        }
        Ok(())
    }
}
