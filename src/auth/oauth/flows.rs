use crate::{
    auth::{
        config::OAuthConfig,
        error::AuthError,
        oauth::{
            identity::{IdentityResolver, UserStore},
            profile::ProfileNormalizer,
            providers::{ProviderKind, ProviderRegistry},
            state::{StateStore, generate_state_token},
            token::TokenExchangeClient,
        },
        session::{SessionManager, SessionTicket},
    },
    cache::CacheManager,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

const LOGIN_EVENT_CAPACITY: usize = 64;

/// Parameters a provider sends back to the callback route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// Apple only, present on the first consent
    pub user: Option<String>,
}

/// Where to send the browser next, plus the session to set on success
#[derive(Debug, Clone)]
pub struct FlowRedirect {
    pub location: String,
    pub session: Option<SessionTicket>,
}

impl FlowRedirect {
    fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            session: None,
        }
    }
}

/// Fired after every successful sign-in
#[derive(Debug, Clone, Serialize)]
pub struct LoginEvent {
    pub identity_id: Uuid,
    pub email: String,
    pub provider: ProviderKind,
    pub created: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub display_name: String,
    pub authorize_url: String,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

/// Social sign-in flows: the redirect initiator and the callback orchestrator
pub struct OAuthFlows {
    registry: ProviderRegistry,
    states: StateStore,
    tokens: TokenExchangeClient,
    profiles: ProfileNormalizer,
    identities: IdentityResolver,
    sessions: Arc<dyn SessionManager>,
    events: broadcast::Sender<LoginEvent>,
    login_url: String,
    account_url: String,
}

impl OAuthFlows {
    pub fn new(
        config: &OAuthConfig,
        cache: &CacheManager,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionManager>,
    ) -> Result<Self, AuthError> {
        let timeout = Duration::from_secs(config.http_timeout);
        let (events, _) = broadcast::channel(LOGIN_EVENT_CAPACITY);

        Ok(Self {
            registry: ProviderRegistry::new(config),
            states: StateStore::new(cache, Duration::from_secs(config.state_ttl)),
            tokens: TokenExchangeClient::new(timeout)?,
            profiles: ProfileNormalizer::new(timeout)?,
            identities: IdentityResolver::new(users),
            sessions,
            events,
            login_url: config.login_url.clone(),
            account_url: config.account_url.clone(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        &self.sessions
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn list_providers(&self) -> ProvidersResponse {
        let providers = self
            .registry
            .available()
            .into_iter()
            .map(|provider| ProviderInfo {
                name: provider.kind.as_str().to_string(),
                display_name: provider.kind.display_name().to_string(),
                authorize_url: format!("/auth/{}", provider.kind),
            })
            .collect();
        ProvidersResponse { providers }
    }

    /// Start a sign-in: mint and store a state token, then point the browser
    /// at the provider's consent page.
    pub async fn begin_authorization(&self, provider_key: &str) -> FlowRedirect {
        match self.authorization_redirect(provider_key).await {
            Ok(location) => FlowRedirect::to(location),
            Err(e) => self.failure(provider_key, e),
        }
    }

    async fn authorization_redirect(&self, provider_key: &str) -> Result<String, AuthError> {
        let provider = self.registry.resolve(provider_key)?;

        let state = generate_state_token();
        self.states
            .put(&state, provider.kind)
            .await
            .map_err(|e| AuthError::StateStore(e.to_string()))?;

        let url = provider.authorization_url(&state)?;
        debug!(provider = %provider.kind, "Redirecting to provider consent page");
        Ok(url)
    }

    /// Complete a sign-in from the provider's callback.
    ///
    /// Every outcome is a redirect: the account area on success (with the new
    /// session), the login page with exactly one notice on failure.
    pub async fn handle_callback(
        &self,
        provider_key: &str,
        params: CallbackParams,
        session_token: Option<&str>,
    ) -> FlowRedirect {
        if let Some(token) = session_token {
            if self.sessions.authenticate(token).await.is_some() {
                debug!(provider = %provider_key, "Already signed in, skipping callback");
                return FlowRedirect::to(self.account_url.clone());
            }
        }

        match self.complete_callback(provider_key, params).await {
            Ok(ticket) => FlowRedirect {
                location: self.account_url.clone(),
                session: Some(ticket),
            },
            Err(e) => self.failure(provider_key, e),
        }
    }

    async fn complete_callback(
        &self,
        provider_key: &str,
        params: CallbackParams,
    ) -> Result<SessionTicket, AuthError> {
        let CallbackParams {
            code,
            state,
            error,
            error_description,
            user,
        } = params;
        let code = code.filter(|c| !c.is_empty());
        let state = state.filter(|s| !s.is_empty());

        if let Some(error) = error {
            // The attempt is over; its state must not be reusable
            if let Some(state) = &state {
                self.discard_state(state).await;
            }
            return Err(AuthError::ProviderDenied {
                error,
                description: error_description,
            });
        }

        let (code, kind) = match (code, state) {
            (Some(code), Some(state)) => (code, self.verify_state(provider_key, &state).await?),
            (None, Some(state)) => {
                self.discard_state(&state).await;
                debug!(provider = %provider_key, "Callback without code");
                return Err(AuthError::Csrf);
            }
            (_, None) => {
                debug!(provider = %provider_key, "Callback without state");
                return Err(AuthError::Csrf);
            }
        };

        let provider = self.registry.resolve(kind.as_str())?;
        let tokens = self.tokens.exchange_code(&provider, &code).await?;
        let profile = self
            .profiles
            .fetch_profile(&provider, &tokens, user.as_deref())
            .await?;
        let resolved = self.identities.resolve(&profile, kind).await?;
        let ticket = self.sessions.establish_session(&resolved.identity).await?;

        info!(
            provider = %kind,
            user_id = %resolved.identity.id,
            created = resolved.created,
            "Social sign-in completed"
        );

        // No subscribers is not an error
        let _ = self.events.send(LoginEvent {
            identity_id: resolved.identity.id,
            email: resolved.identity.email.clone(),
            provider: kind,
            created: resolved.created,
            at: Utc::now(),
        });

        Ok(ticket)
    }

    /// Consume the state and check it was minted for this route's provider.
    /// All failure reasons look the same to the caller.
    async fn verify_state(&self, provider_key: &str, state: &str) -> Result<ProviderKind, AuthError> {
        match self.states.consume(state).await {
            Ok(Some(kind)) if kind.as_str() == provider_key => Ok(kind),
            Ok(Some(kind)) => {
                debug!(route = %provider_key, bound = %kind, "State bound to a different provider");
                Err(AuthError::Csrf)
            }
            Ok(None) => {
                debug!(provider = %provider_key, "State not found or expired");
                Err(AuthError::Csrf)
            }
            Err(e) => {
                warn!(provider = %provider_key, "State store error during verification: {}", e);
                Err(AuthError::Csrf)
            }
        }
    }

    async fn discard_state(&self, state: &str) {
        if let Err(e) = self.states.consume(state).await {
            warn!("Failed to discard state token: {}", e);
        }
    }

    /// A callback whose parameters could not be read at all is treated like a
    /// forged one
    pub fn reject_callback(&self, provider_key: &str, reason: &str) -> FlowRedirect {
        debug!(provider = %provider_key, "Unreadable callback parameters: {}", reason);
        self.failure(provider_key, AuthError::Csrf)
    }

    fn failure(&self, provider_key: &str, error: AuthError) -> FlowRedirect {
        match &error {
            AuthError::ProviderDenied { .. } | AuthError::Csrf | AuthError::Configuration { .. } => {
                info!(provider = %provider_key, kind = error.kind(), "Social sign-in stopped: {}", error)
            }
            _ => warn!(provider = %provider_key, kind = error.kind(), "Social sign-in failed: {}", error),
        }
        FlowRedirect::to(with_notice(&self.login_url, &error.user_notice()))
    }
}

/// Append a `notice` query parameter to a (possibly relative) URL
pub fn with_notice(url: &str, notice: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("notice", notice)
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}
