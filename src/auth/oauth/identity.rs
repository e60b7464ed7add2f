use crate::auth::{
    error::AuthError,
    oauth::{profile::UserProfile, providers::ProviderKind},
};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "customer";
const FALLBACK_HANDLE: &str = "member";
const MAX_HANDLE_LEN: usize = 32;
const HANDLE_SUFFIX_LEN: usize = 4;
const MAX_HANDLE_ATTEMPTS: usize = 8;
const GENERATED_PASSWORD_LEN: usize = 32;

/// An account record keyed by email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create an account
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub handle: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub password_hash: String,
    pub provider: ProviderKind,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("{0} already taken")]
    Conflict(String),
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("user store error: {0}")]
    Backend(String),
}

pub type UserStoreResult<T> = Result<T, UserStoreError>;

/// Account storage the sign-in flow writes through
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive exact email lookup
    async fn find_by_email(&self, email: &str) -> UserStoreResult<Option<Identity>>;

    async fn handle_exists(&self, handle: &str) -> UserStoreResult<bool>;

    /// Create an account. Fails with `Conflict` when the email or handle exists.
    async fn create_user(&self, new: NewIdentity) -> UserStoreResult<Identity>;

    async fn update_last_provider(
        &self,
        id: Uuid,
        provider: ProviderKind,
    ) -> UserStoreResult<Identity>;
}

/// In-process user store
#[derive(Default)]
pub struct MemoryUserStore {
    by_email: DashMap<String, Identity>,
    handles: DashSet<String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> UserStoreResult<Option<Identity>> {
        Ok(self
            .by_email
            .get(&email_key(email))
            .map(|entry| entry.value().clone()))
    }

    async fn handle_exists(&self, handle: &str) -> UserStoreResult<bool> {
        Ok(self.handles.contains(handle))
    }

    async fn create_user(&self, new: NewIdentity) -> UserStoreResult<Identity> {
        if !self.handles.insert(new.handle.clone()) {
            return Err(UserStoreError::Conflict(format!("handle '{}'", new.handle)));
        }

        match self.by_email.entry(email_key(&new.email)) {
            Entry::Occupied(_) => {
                self.handles.remove(&new.handle);
                Err(UserStoreError::Conflict("email".to_string()))
            }
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let identity = Identity {
                    id: Uuid::new_v4(),
                    handle: new.handle,
                    email: new.email.trim().to_string(),
                    first_name: new.first_name,
                    last_name: new.last_name,
                    role: new.role,
                    password_hash: new.password_hash,
                    last_provider: new.provider,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(identity.clone());
                Ok(identity)
            }
        }
    }

    async fn update_last_provider(
        &self,
        id: Uuid,
        provider: ProviderKind,
    ) -> UserStoreResult<Identity> {
        let mut entry = self
            .by_email
            .iter_mut()
            .find(|entry| entry.value().id == id)
            .ok_or_else(|| UserStoreError::NotFound(id.to_string()))?;

        let identity = entry.value_mut();
        identity.last_provider = provider;
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }
}

/// Outcome of resolving a profile to an account
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub created: bool,
}

/// Finds or creates the account behind a normalized profile
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn UserStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        profile: &UserProfile,
        provider: ProviderKind,
    ) -> Result<ResolvedIdentity, AuthError> {
        if let Some(existing) = self.store.find_by_email(&profile.email).await.map_err(identity_error)? {
            return self.refresh_existing(existing, provider).await;
        }

        let base = derive_handle(&profile.email);
        let password_hash = hash_password(generate_password()).await?;

        for attempt in 0..MAX_HANDLE_ATTEMPTS {
            let handle = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base)
            };

            if self.store.handle_exists(&handle).await.map_err(identity_error)? {
                continue;
            }

            let new = NewIdentity {
                handle,
                email: profile.email.clone(),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                role: DEFAULT_ROLE.to_string(),
                password_hash: password_hash.clone(),
                provider,
            };

            match self.store.create_user(new).await {
                Ok(identity) => {
                    info!(user_id = %identity.id, handle = %identity.handle, provider = %provider, "Created account from social sign-in");
                    return Ok(ResolvedIdentity {
                        identity,
                        created: true,
                    });
                }
                Err(UserStoreError::Conflict(what)) => {
                    // A concurrent first login may have created the same email
                    if let Some(existing) = self
                        .store
                        .find_by_email(&profile.email)
                        .await
                        .map_err(identity_error)?
                    {
                        return self.refresh_existing(existing, provider).await;
                    }
                    warn!("Account creation conflict on {}, retrying", what);
                }
                Err(e) => return Err(identity_error(e)),
            }
        }

        Err(AuthError::Identity(format!(
            "no free handle derived from '{base}' after {MAX_HANDLE_ATTEMPTS} attempts"
        )))
    }

    async fn refresh_existing(
        &self,
        existing: Identity,
        provider: ProviderKind,
    ) -> Result<ResolvedIdentity, AuthError> {
        let identity = self
            .store
            .update_last_provider(existing.id, provider)
            .await
            .map_err(identity_error)?;
        Ok(ResolvedIdentity {
            identity,
            created: false,
        })
    }
}

fn identity_error(e: UserStoreError) -> AuthError {
    AuthError::Identity(e.to_string())
}

/// Lower-cased email local part restricted to `[a-z0-9._-]`
pub fn derive_handle(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    let sanitized: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_HANDLE_LEN)
        .collect();
    let trimmed = sanitized.trim_matches(|c: char| matches!(c, '.' | '_' | '-'));

    if trimmed.is_empty() {
        FALLBACK_HANDLE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn with_suffix(base: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(HANDLE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let keep = MAX_HANDLE_LEN - HANDLE_SUFFIX_LEN - 1;
    let base: String = base.chars().take(keep).collect();
    format!("{base}-{suffix}")
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Salted Argon2id PHC string. Runs on a blocking thread.
async fn hash_password(password: String) -> Result<String, AuthError> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Identity(format!("failed to hash password: {e}")))
    })
    .await
    .map_err(|e| AuthError::Identity(format!("password hashing task failed: {e}")))?
}
