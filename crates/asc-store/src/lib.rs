//! Shared key-value store abstraction.
//!
//! Every stateful component in the workspace — the lock manager, instance
//! tracker, group registry, shutdown manager, audit log, job queue — reads
//! and writes through this one trait instead of touching Redis directly, so
//! a single in-memory implementation can back unit tests and local dev.

mod error;
mod memory;
mod redis_store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

/// Minimal KV store with TTLs and prefix scans. Scans are cursor-based and
/// not snapshot-consistent: a key written or expired mid-scan may or may not
/// appear in the results, matching Redis `SCAN`'s own guarantees.
#[async_trait]
pub trait Store: Send + Sync {
    /// Set `key` to `value`, with an optional TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<()>;

    /// Set `key` to `value` only if it does not already exist, with an
    /// optional TTL. Returns `true` if the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Iterate every key matching a `*`-glob prefix pattern (e.g.
    /// `instance:status:jibri-eu:*`). Order is unspecified.
    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically increment a counter key, creating it at `0` first if
    /// absent, and return the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Refresh the TTL on an existing key without touching its value.
    /// No-op (returns `Ok(())`) if the key is absent.
    async fn expire(&self, key: &str, ttl_sec: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise_basic_contract(store: &dyn Store) {
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("a", "1", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        assert!(!store.set_if_absent("a", "2", None).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        assert!(store.set_if_absent("b", "2", None).await.unwrap());
        assert_eq!(store.get("b").await.unwrap(), Some("2".to_string()));

        let values = store
            .mget(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), Some("2".to_string()), None]
        );

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn memory_store_satisfies_contract() {
        let store = MemoryStore::new();
        exercise_basic_contract(&store).await;
    }

    #[tokio::test]
    async fn memory_store_scan_match_respects_glob_prefix() {
        let store = MemoryStore::new();
        store.set("instance:status:jibri-eu:a", "x", None).await.unwrap();
        store.set("instance:status:jibri-eu:b", "x", None).await.unwrap();
        store.set("instance:status:jvb-us:c", "x", None).await.unwrap();

        let mut matched = store.scan_match("instance:status:jibri-eu:*").await.unwrap();
        matched.sort();
        assert_eq!(
            matched,
            vec![
                "instance:status:jibri-eu:a".to_string(),
                "instance:status:jibri-eu:b".to_string(),
            ]
        );
    }
}
