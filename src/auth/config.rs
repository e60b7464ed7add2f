use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

use crate::auth::oauth::providers::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Public origin of this site, used to derive canonical callback URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where failed sign-ins land (with a `notice` query parameter)
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Account dashboard reached after a successful sign-in
    #[serde(default = "default_account_url")]
    pub account_url: String,
    /// Lifetime of CSRF state tokens in seconds
    #[serde(default = "default_state_ttl")]
    pub state_ttl: u64,
    /// Timeout for every outbound provider call in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
    #[serde(default)]
    pub providers: HashMap<String, OAuthProvider>,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_login_url() -> String {
    "/account/login".to_string()
}

fn default_account_url() -> String {
    "/account".to_string()
}

fn default_state_ttl() -> u64 {
    600 // 10 minutes
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_url: default_login_url(),
            account_url: default_account_url(),
            state_ttl: default_state_ttl(),
            http_timeout: default_http_timeout(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session tokens. A random per-process key is used when unset.
    #[serde(default, skip_serializing)]
    pub secret: Option<SecretString>,
    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure`
    #[serde(default = "default_secure")]
    pub secure: bool,
}

fn default_session_ttl() -> u64 {
    86400 // 24 hours
}

fn default_cookie_name() -> String {
    "social_sso_session".to_string()
}

fn default_secure() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            ttl: default_session_ttl(),
            cookie_name: default_cookie_name(),
            secure: default_secure(),
        }
    }
}

/// Admin-configured settings for one sign-in provider.
///
/// Secrets are never serialized and print as redacted in `Debug` output.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthProvider {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Static client secret (Google, Facebook)
    #[serde(default, skip_serializing)]
    pub client_secret: Option<SecretString>,
    /// Apple developer team id
    #[serde(default)]
    pub team_id: Option<String>,
    /// Apple signing key id
    #[serde(default)]
    pub key_id: Option<String>,
    /// Apple signing key as inline PEM
    #[serde(default, skip_serializing)]
    pub private_key: Option<SecretString>,
    /// Apple signing key read from a `.p8` file
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub user_info_url: Option<String>,
}

/// Fill in the well-known endpoints and scopes of a provider kind
pub fn apply_predefined_provider_defaults(kind: ProviderKind, provider: &mut OAuthProvider) {
    match kind {
        ProviderKind::Google => apply_google_defaults(provider),
        ProviderKind::Facebook => apply_facebook_defaults(provider),
        ProviderKind::Apple => apply_apple_defaults(provider),
    }
}

fn apply_google_defaults(provider: &mut OAuthProvider) {
    if provider.authorization_url.is_none() {
        provider.authorization_url =
            Some("https://accounts.google.com/o/oauth2/v2/auth".to_string());
    }
    if provider.token_url.is_none() {
        provider.token_url = Some("https://oauth2.googleapis.com/token".to_string());
    }
    if provider.user_info_url.is_none() {
        provider.user_info_url =
            Some("https://openidconnect.googleapis.com/v1/userinfo".to_string());
    }
    if provider.scopes.is_empty() {
        provider.scopes = vec![
            "openid".to_string(),
            "email".to_string(),
            "profile".to_string(),
        ];
    }
}

fn apply_facebook_defaults(provider: &mut OAuthProvider) {
    if provider.authorization_url.is_none() {
        provider.authorization_url =
            Some("https://www.facebook.com/v19.0/dialog/oauth".to_string());
    }
    if provider.token_url.is_none() {
        provider.token_url =
            Some("https://graph.facebook.com/v19.0/oauth/access_token".to_string());
    }
    if provider.user_info_url.is_none() {
        provider.user_info_url = Some(
            "https://graph.facebook.com/v19.0/me?fields=id,email,first_name,last_name".to_string(),
        );
    }
    if provider.scopes.is_empty() {
        provider.scopes = vec!["email".to_string(), "public_profile".to_string()];
    }
}

fn apply_apple_defaults(provider: &mut OAuthProvider) {
    if provider.authorization_url.is_none() {
        provider.authorization_url = Some("https://appleid.apple.com/auth/authorize".to_string());
    }
    if provider.token_url.is_none() {
        provider.token_url = Some("https://appleid.apple.com/auth/token".to_string());
    }
    // Apple has no profile endpoint; identity comes from the id_token
    if provider.scopes.is_empty() {
        provider.scopes = vec!["name".to_string(), "email".to_string()];
    }
}
