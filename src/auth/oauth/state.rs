use crate::auth::oauth::providers::ProviderKind;
use crate::cache::{CacheManager, CacheResult, CachedObject, TypedCache};
use chrono::{DateTime, Utc};
use oauth2::CsrfToken;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OAuth state token TTL (10 minutes)
pub const OAUTH_STATE_TTL_SECONDS: u64 = 600;

/// Random bytes behind every state token (base64url encoded to 43 characters)
pub const STATE_TOKEN_BYTES: u32 = 32;

/// CSRF state bound to the provider it was minted for
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateData {
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedObject for StateData {
    fn cache_prefix() -> &'static str {
        "StateData"
    }
}

impl StateData {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Generate a fresh unguessable state token
pub fn generate_state_token() -> String {
    CsrfToken::new_random_len(STATE_TOKEN_BYTES).secret().clone()
}

/// Expiring, single-use store of CSRF state tokens
#[derive(Clone)]
pub struct StateStore {
    cache: TypedCache<StateData>,
    ttl: Duration,
}

impl StateStore {
    pub fn new(cache: &CacheManager, ttl: Duration) -> Self {
        Self {
            cache: cache.cache::<StateData>(),
            ttl,
        }
    }

    /// Register a token bound to a provider, valid for the store TTL from now
    pub async fn put(&self, token: &str, provider: ProviderKind) -> CacheResult<()> {
        self.put_at(token, provider, Utc::now()).await
    }

    /// Register a token as if it had been minted at `created_at`
    pub async fn put_at(
        &self,
        token: &str,
        provider: ProviderKind,
        created_at: DateTime<Utc>,
    ) -> CacheResult<()> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(OAUTH_STATE_TTL_SECONDS as i64));
        let expires_at = created_at + ttl;

        // Backend TTL is only for eviction; expiry is decided from `expires_at`
        let remaining = (expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));

        let data = StateData {
            provider,
            created_at,
            expires_at,
        };
        self.cache.put(token, &data, remaining).await
    }

    /// Atomically consume a token.
    ///
    /// Returns the bound provider exactly once; every later call, and any call
    /// after expiry, returns `None`.
    pub async fn consume(&self, token: &str) -> CacheResult<Option<ProviderKind>> {
        let data = self.cache.take(token).await?;
        let now = Utc::now();
        Ok(data.filter(|d| !d.is_expired(now)).map(|d| d.provider))
    }
}
