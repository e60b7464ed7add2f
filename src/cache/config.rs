use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expiring key/value store settings. Sign-in state tokens live here, so a
/// multi-instance deployment must point every instance at the same Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// `memory` or `redis`
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,
    /// Seconds between sweeps of expired entries in the memory backend
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl CacheConfig {
    pub fn cleanup_period(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_secs(self.cleanup_interval.max(1))
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_key_prefix() -> String {
    "social_sso:".to_string()
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: default_redis_url(),
            redis_key_prefix: default_redis_key_prefix(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}
