//! Cache layer for short-lived data
//!
//! Values are stored as JSON under a type-specific prefix. Two backends are
//! supported: an in-process map for single-instance deployments and tests, and
//! Redis for deployments with more than one instance. Both provide an atomic
//! `take` (read-and-delete) which single-use tokens rely on.

pub mod config;
pub mod memory;
pub mod redis;

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;

use crate::cache::config::CacheConfig;
use crate::cache::memory::MemoryStore;
use crate::cache::redis::RedisStore;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Types that can be stored through a [`TypedCache`]
pub trait CachedObject:
    Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static
{
    /// Key namespace for this type
    fn cache_prefix() -> &'static str;
}

/// Storage backend shared by every typed cache of one manager
#[derive(Clone)]
pub enum CacheBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl CacheBackend {
    async fn set(&self, key: &str, data: String, ttl: Duration) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(store) => store.set(key, data, ttl).await,
            CacheBackend::Redis(store) => store.set(key, data, ttl).await,
        }
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            CacheBackend::Memory(store) => store.take(key).await,
            CacheBackend::Redis(store) => store.take(key).await,
        }
    }
}

/// Typed view over the cache backend for a specific type T
#[derive(Clone)]
pub struct TypedCache<T: CachedObject> {
    backend: CacheBackend,
    _phantom: PhantomData<T>,
}

impl<T: CachedObject> TypedCache<T> {
    pub(crate) fn new(backend: CacheBackend) -> Self {
        Self {
            backend,
            _phantom: PhantomData,
        }
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", T::cache_prefix(), key)
    }

    /// Store a value that the backend drops after `ttl`
    pub async fn put(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()> {
        let data =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend.set(&self.cache_key(key), data, ttl).await
    }

    /// Atomically read and remove a value.
    ///
    /// Of any number of concurrent callers for the same key at most one
    /// observes `Some`.
    pub async fn take(&self, key: &str) -> CacheResult<Option<T>> {
        let data = self.backend.take(&self.cache_key(key)).await?;
        data.map(|d| decode::<T>(&d)).transpose()
    }
}

fn decode<T: CachedObject>(data: &str) -> CacheResult<T> {
    serde_json::from_str(data).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Cache manager - creates TypedCache instances over one backend
#[derive(Clone)]
pub struct CacheManager {
    config: CacheConfig,
    backend: CacheBackend,
}

impl CacheManager {
    /// Create new cache manager with memory backend (for testing/single instance)
    pub fn new_memory() -> Self {
        Self {
            config: CacheConfig {
                backend: "memory".to_string(),
                ..Default::default()
            },
            backend: CacheBackend::Memory(MemoryStore::new()),
        }
    }

    /// Create cache manager from configuration
    pub async fn new_from_config(config: &CacheConfig) -> CacheResult<Self> {
        let backend = match config.backend.as_str() {
            "redis" => {
                let store = RedisStore::new(&config.redis_url, config.redis_key_prefix.clone())?;
                // Fail early if Redis is not reachable
                store.health_check().await?;
                CacheBackend::Redis(store)
            }
            "memory" => CacheBackend::Memory(MemoryStore::new()),
            other => {
                return Err(CacheError::Cache(format!(
                    "Unknown cache backend '{other}', expected 'memory' or 'redis'"
                )));
            }
        };

        Ok(Self {
            config: config.clone(),
            backend,
        })
    }

    /// Get a typed cache for type T
    pub fn cache<T: CachedObject>(&self) -> TypedCache<T> {
        TypedCache::new(self.backend.clone())
    }

    /// Drop expired entries. Only the memory backend needs this; Redis expires keys itself.
    pub async fn purge_expired(&self) -> usize {
        match &self.backend {
            CacheBackend::Memory(store) => store.purge_expired().await,
            CacheBackend::Redis(_) => 0,
        }
    }

    pub fn backend_type(&self) -> &str {
        &self.config.backend
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.config.cleanup_period()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestNonce {
        value: String,
    }

    impl CachedObject for TestNonce {
        fn cache_prefix() -> &'static str {
            "TestNonce"
        }
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct OtherNonce {
        value: String,
    }

    impl CachedObject for OtherNonce {
        fn cache_prefix() -> &'static str {
            "OtherNonce"
        }
    }

    #[tokio::test]
    async fn test_typed_cache_put_take() {
        let manager = CacheManager::new_memory();
        let cache = manager.cache::<TestNonce>();
        let nonce = TestNonce {
            value: "abc".to_string(),
        };

        cache.put("k", &nonce, MINUTE).await.unwrap();
        assert_eq!(cache.take("k").await.unwrap(), Some(nonce));
        assert_eq!(cache.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_isolated_by_type() {
        let manager = CacheManager::new_memory();
        let first = manager.cache::<TestNonce>();
        let second = manager.cache::<OtherNonce>();

        first
            .put("shared", &TestNonce { value: "a".into() }, MINUTE)
            .await
            .unwrap();

        assert_eq!(second.take("shared").await.unwrap(), None);
        assert_ne!(first.cache_key("shared"), second.cache_key("shared"));
        assert!(first.take("shared").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_take_single_winner() {
        let manager = CacheManager::new_memory();
        let cache = manager.cache::<TestNonce>();
        cache
            .put("once", &TestNonce { value: "x".into() }, MINUTE)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.take("once").await.unwrap() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let config = CacheConfig {
            backend: "memcached".to_string(),
            ..Default::default()
        };
        let result = CacheManager::new_from_config(&config).await;
        assert!(matches!(result, Err(CacheError::Cache(_))));
    }
}
