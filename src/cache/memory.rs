use super::CacheResult;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache entry with expiration
#[derive(Clone, Debug)]
struct CacheEntry {
    data: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(data: String, ttl: Duration) -> Self {
        // A TTL too large for chrono is treated as no expiry
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|duration| Utc::now().checked_add_signed(duration));
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}

/// In-memory cache store
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, data: String, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry::new(data, ttl);
        self.store.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    /// Remove and return the entry under a single write lock
    pub async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        let entry = self.store.write().await.remove(key);
        Ok(entry.filter(|e| !e.is_expired()).map(|e| e.data))
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired());
        before - store.len()
    }
}
