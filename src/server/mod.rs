pub mod route_builder;

use crate::{
    auth::{
        oauth::{MemoryUserStore, OAuthFlows, UserStore},
        session::{JwtSessionManager, SessionManager},
    },
    cache::CacheManager,
    config::Config,
    error::AppError,
    routes::create_auth_routes,
    server::route_builder::request_response_logger,
};
use axum::{Router, middleware};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub cache: Arc<CacheManager>,
    pub users: Arc<dyn UserStore>,
    pub oauth_flows: Arc<OAuthFlows>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let cache = CacheManager::new_from_config(&config.cache).await?;
        info!("Cache backend: {}", cache.backend_type());

        Self::with_components(config, cache, Arc::new(MemoryUserStore::new()))
    }

    /// Assemble a server around an existing cache and user store
    pub fn with_components(
        config: Config,
        cache: CacheManager,
        users: Arc<dyn UserStore>,
    ) -> Result<Self, AppError> {
        let sessions: Arc<dyn SessionManager> = Arc::new(JwtSessionManager::new(&config.session));
        let oauth_flows = Arc::new(OAuthFlows::new(
            &config.oauth,
            &cache,
            users.clone(),
            sessions,
        )?);

        let enabled: Vec<_> = oauth_flows
            .list_providers()
            .providers
            .into_iter()
            .map(|p| p.name)
            .collect();
        info!("Sign-in providers available: {:?}", enabled);

        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            users,
            oauth_flows,
        })
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let sweeper = self.spawn_cache_sweeper();
        let app = self.create_app();

        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to address: {}", e)))?;

        info!("Server listening on http://{}", addr);

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Graceful shutdown initiated");
        })
        .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }

        result.map_err(AppError::Io)?;
        info!("Server shutdown complete");
        Ok(())
    }

    // Creates an application router
    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .nest("/auth", create_auth_routes())
            .with_state(self.clone());

        if self.config.logging.log_request {
            app = app.layer(middleware::from_fn(request_response_logger));
        }
        app
    }

    /// Periodically drop expired cache entries. Memory backend only; Redis
    /// expires keys itself.
    fn spawn_cache_sweeper(&self) -> Option<JoinHandle<()>> {
        if self.cache.backend_type() != "memory" {
            return None;
        }

        let cache = self.cache.clone();
        let period = cache.cleanup_interval();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = cache.purge_expired().await;
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        }))
    }
}
