//! In-memory cache implementation using moka
//!
//! Every entry carries its own time-to-live, enforced by a moka `Expiry`
//! policy. Values are stored as JSON so any serializable type fits.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries (15 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(900);

#[derive(Clone)]
struct CacheEntry {
    /// JSON-serialized value
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expires each entry after the TTL it was stored with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a new memory cache with custom capacity and default TTL
    ///
    /// # Arguments
    /// * `max_capacity` - Maximum number of entries the cache can hold
    /// * `default_ttl` - TTL callers use when they have no better value
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the current number of entries in the cache
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    /// Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();

        cache
            .set("user:a@example.com", &"payload".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("user:a@example.com").await.unwrap();
        assert_eq!(result, Some("payload".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = MemoryCache::new();
        let result: Option<String> = cache.get("missing").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache
            .set("key", &42_i64, Duration::from_secs(60))
            .await
            .unwrap();

        cache.delete("key").await.unwrap();
        cache.delete("key").await.unwrap();

        let result: Option<i64> = cache.get("key").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let cache = MemoryCache::new();
        cache
            .set("key", &"text".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Result<Option<i64>> = cache.get("key").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_entries_expire_independently() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));

        cache.set("short", &1_i64, Duration::from_millis(20)).await.unwrap();
        cache.set("long", &2_i64, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        let short: Option<i64> = cache.get("short").await.unwrap();
        let long: Option<i64> = cache.get("long").await.unwrap();
        assert_eq!(short, None);
        assert_eq!(long, Some(2));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A value read back before its TTL elapses equals the value stored.
        #[test]
        fn prop_set_then_get_returns_value(
            key in "[a-z]{1,10}",
            value in "[a-zA-Z0-9 ]{0,100}"
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Option<String> = rt.block_on(async {
                let cache = MemoryCache::new();
                cache.set(&key, &value, Duration::from_secs(60)).await.unwrap();
                cache.get(&key).await.unwrap()
            });
            prop_assert_eq!(result, Some(value));
        }
    }
}
