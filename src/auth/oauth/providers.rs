use crate::auth::{
    config::{OAuthConfig, OAuthProvider, apply_predefined_provider_defaults},
    error::AuthError,
};
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope, basic::BasicClient};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// The closed set of supported sign-in providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Facebook,
    Apple,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Google,
        ProviderKind::Facebook,
        ProviderKind::Apple,
    ];

    /// Parse a route key. Unknown keys yield `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "google" => Some(ProviderKind::Google),
            "facebook" => Some(ProviderKind::Facebook),
            "apple" => Some(ProviderKind::Apple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Apple => "apple",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Apple => "Apple",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Material needed to mint Apple's signed client assertion
#[derive(Debug, Clone)]
pub struct AppleSigningKey {
    pub team_id: String,
    pub key_id: String,
    /// PKCS#8 (`.p8`) or SEC1 PEM
    pub private_key: SecretString,
}

/// How a provider authenticates this client at its token endpoint
#[derive(Debug, Clone)]
pub enum ClientCredentials {
    /// Static shared secret
    Secret(SecretString),
    /// Per-request ES256 client assertion
    AppleKey(AppleSigningKey),
}

/// Fully resolved, immutable provider configuration for one request
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub client_id: String,
    pub credentials: ClientCredentials,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: Option<String>,
    pub scopes: Vec<String>,
    /// Canonical callback URL, derived from the site base URL
    pub redirect_uri: String,
}

impl ProviderConfig {
    /// Build the provider consent URL carrying the given CSRF state
    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let auth_url = AuthUrl::new(self.auth_url.clone()).map_err(|e| {
            AuthError::configuration(self.kind.as_str(), format!("invalid authorization URL: {e}"))
        })?;
        let redirect_url = RedirectUrl::new(self.redirect_uri.clone()).map_err(|e| {
            AuthError::configuration(self.kind.as_str(), format!("invalid redirect URI: {e}"))
        })?;

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let state = state.to_string();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new));

        if self.kind == ProviderKind::Apple {
            // Apple posts the callback as a form body; it is the only mode that
            // delivers the one-time `user` parameter
            request = request.add_extra_param("response_mode", "form_post");
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }
}

/// Resolves provider keys to usable configurations
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    base_url: String,
    providers: HashMap<String, OAuthProvider>,
}

impl ProviderRegistry {
    pub fn new(config: &OAuthConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|(name, provider)| (name.clone(), load_key_file(name, provider.clone())))
            .collect();

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            providers,
        }
    }

    /// Canonical callback URL for a provider; never taken from the request
    pub fn redirect_uri(&self, kind: ProviderKind) -> String {
        format!("{}/auth/{}/callback", self.base_url, kind)
    }

    /// Resolve a route key to a usable provider configuration.
    ///
    /// Unknown, absent, disabled and incomplete providers all resolve to a
    /// configuration error.
    pub fn resolve(&self, key: &str) -> Result<ProviderConfig, AuthError> {
        let kind = ProviderKind::from_key(key)
            .ok_or_else(|| AuthError::configuration(key, "unknown provider"))?;

        let mut provider = self
            .providers
            .get(kind.as_str())
            .cloned()
            .ok_or_else(|| AuthError::configuration(key, "not configured"))?;

        if !provider.enabled {
            return Err(AuthError::configuration(key, "disabled"));
        }

        let client_id = provider
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AuthError::configuration(key, "missing client_id"))?;

        apply_predefined_provider_defaults(kind, &mut provider);

        let credentials = match kind {
            ProviderKind::Google | ProviderKind::Facebook => {
                let secret = non_empty_secret(provider.client_secret.as_ref())
                    .ok_or_else(|| AuthError::configuration(key, "missing client_secret"))?;
                ClientCredentials::Secret(secret)
            }
            ProviderKind::Apple => {
                let team_id = non_empty(provider.team_id.as_ref())
                    .ok_or_else(|| AuthError::configuration(key, "missing team_id"))?;
                let key_id = non_empty(provider.key_id.as_ref())
                    .ok_or_else(|| AuthError::configuration(key, "missing key_id"))?;
                let private_key = non_empty_secret(provider.private_key.as_ref())
                    .ok_or_else(|| AuthError::configuration(key, "missing private_key"))?;
                ClientCredentials::AppleKey(AppleSigningKey {
                    team_id,
                    key_id,
                    private_key,
                })
            }
        };

        let auth_url = provider
            .authorization_url
            .ok_or_else(|| AuthError::configuration(key, "missing authorization_url"))?;
        let token_url = provider
            .token_url
            .ok_or_else(|| AuthError::configuration(key, "missing token_url"))?;

        Ok(ProviderConfig {
            kind,
            client_id,
            credentials,
            auth_url,
            token_url,
            profile_url: provider.user_info_url,
            scopes: provider.scopes,
            redirect_uri: self.redirect_uri(kind),
        })
    }

    /// All providers that currently resolve, in a stable order
    pub fn available(&self) -> Vec<ProviderConfig> {
        ProviderKind::ALL
            .iter()
            .filter_map(|kind| self.resolve(kind.as_str()).ok())
            .collect()
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn non_empty_secret(value: Option<&SecretString>) -> Option<SecretString> {
    value
        .filter(|v| !v.expose_secret().trim().is_empty())
        .cloned()
}

/// Read `private_key_path` into `private_key` once at startup
fn load_key_file(name: &str, mut provider: OAuthProvider) -> OAuthProvider {
    if provider.private_key.is_none() {
        if let Some(path) = &provider.private_key_path {
            match std::fs::read_to_string(path) {
                Ok(pem) => provider.private_key = Some(SecretString::from(pem)),
                Err(e) => tracing::warn!(
                    provider = %name,
                    path = %path.display(),
                    "Failed to read private key file: {}",
                    e
                ),
            }
        }
    }
    provider
}
