use crate::{
    auth::oauth::{MemoryUserStore, UserStore},
    cache::CacheManager,
    config::Config,
    server::Server,
};
use secrecy::SecretString;
use std::sync::Arc;

/// Test server builder for creating test instances with in-memory backends
pub struct TestServerBuilder {
    config: Config,
    session_secret: Option<String>,
    users: Option<Arc<dyn UserStore>>,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            session_secret: Some("test-secret".to_string()),
            users: None,
        }
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set a custom session secret for testing
    pub fn with_session_secret(mut self, secret: &str) -> Self {
        self.session_secret = Some(secret.to_string());
        self
    }

    /// Share a user store with the test
    pub fn with_user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    /// Build the test server with a memory cache
    pub async fn build(self) -> Server {
        let mut config = self.config;
        config.cache.backend = "memory".to_string();

        if let Some(secret) = self.session_secret {
            config.session.secret = Some(SecretString::from(secret));
        }

        let users = self
            .users
            .unwrap_or_else(|| Arc::new(MemoryUserStore::new()));

        Server::with_components(config, CacheManager::new_memory(), users).unwrap()
    }
}
