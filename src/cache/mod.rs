//! Cache layer
//!
//! Holds authenticated user records keyed by `user:{email}` so that the auth
//! middleware does not hit the database on every request. It supports:
//! - In-memory cache (moka), the default, for single-instance deployment
//! - Redis cache behind the `redis-cache` feature, for distributed deployment
//!
//! Services only ever delete entries, through [`CacheInvalidator`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use picshare::cache::{create_cache, CacheLayer};
//! use picshare::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set("user:a@example.com", &user, cache.default_ttl()).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; use the
/// `Cache` enum for runtime polymorphism.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Delete-only view of the cache handed to services.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Drop the entry stored under `key`. Missing keys are not an error.
    async fn invalidate(&self, key: &str) -> Result<()>;
}

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Unified cache enum for runtime polymorphism
#[derive(Debug)]
pub enum Cache {
    /// In-memory cache using moka
    Memory(MemoryCache),
    /// Redis cache for distributed deployment
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    /// TTL configured for this cache
    pub fn default_ttl(&self) -> Duration {
        match self {
            Cache::Memory(cache) => cache.default_ttl(),
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.default_ttl(),
        }
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }
}

#[async_trait]
impl CacheInvalidator for Cache {
    async fn invalidate(&self, key: &str) -> Result<()> {
        tracing::debug!("Invalidating cache entry {}", key);
        self.delete(key).await
    }
}

/// Drop a cache entry, logging instead of failing.
///
/// The entity store is the source of truth; a stale entry only lives until
/// its TTL runs out.
pub async fn invalidate_quietly(invalidator: &dyn CacheInvalidator, key: &str) {
    if let Err(e) = invalidator.invalidate(key).await {
        tracing::warn!("Failed to invalidate cache entry {}: {:#}", key, e);
    }
}

/// Create a cache instance based on configuration
///
/// - `CacheDriver::Memory` creates an in-memory cache using moka
/// - `CacheDriver::Redis` creates a Redis cache (requires the `redis-cache` feature)
///
/// # Errors
/// - Redis is configured but the `redis-cache` feature is not enabled
/// - Redis is configured without a URL, or the connection fails
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => {
            let cache = MemoryCache::with_capacity_and_ttl(10_000, ttl);
            Ok(Arc::new(Cache::Memory(cache)))
        }
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using Redis cache driver. \
                         Set 'redis_url' in cache configuration or use PICSHARE_CACHE_REDIS_URL environment variable."
                    )
                })?;

                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled. \
                     Either enable the feature with `--features redis-cache` or use 'memory' cache driver."
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Cache doubles for service tests

    use super::CacheInvalidator;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every invalidated key
    #[derive(Default)]
    pub struct RecordingInvalidator {
        keys: Mutex<Vec<String>>,
    }

    impl RecordingInvalidator {
        pub fn keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CacheInvalidator for RecordingInvalidator {
        async fn invalidate(&self, key: &str) -> Result<()> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    /// Fails every invalidation
    pub struct FailingInvalidator;

    #[async_trait]
    impl CacheInvalidator for FailingInvalidator {
        async fn invalidate(&self, _key: &str) -> Result<()> {
            anyhow::bail!("cache unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let config = CacheConfig::default();
        let cache = create_cache(&config).await.unwrap();

        assert_eq!(cache.default_ttl(), Duration::from_secs(900));
        cache
            .set("test_key", &"test_value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        cache
            .set("user:a@example.com", &1_i64, Duration::from_secs(60))
            .await
            .unwrap();

        invalidate_quietly(cache.as_ref(), "user:a@example.com").await;

        let result: Option<i64> = cache.get("user:a@example.com").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_invalidate_quietly_swallows_failures() {
        invalidate_quietly(&testing::FailingInvalidator, "user:x@example.com").await;
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_create_redis_cache_without_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 3600,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache") && err.contains("feature"));
    }

    #[cfg(feature = "redis-cache")]
    #[tokio::test]
    async fn test_create_redis_cache_without_url() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: None,
            ttl_seconds: 3600,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("Redis URL"));
    }
}
