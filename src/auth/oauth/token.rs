use crate::auth::{
    error::AuthError,
    oauth::{
        apple::mint_client_secret,
        providers::{ClientCredentials, ProviderConfig},
    },
};
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{fmt, time::Duration};
use tracing::{debug, warn};

/// Build the outbound client used for every provider call.
///
/// Redirects are never followed so a provider endpoint cannot bounce the
/// request (and its credentials) elsewhere.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, AuthError> {
    reqwest::ClientBuilder::new()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AuthError::configuration("http", format!("reqwest build error: {e}")))
}

/// Describe a transport failure without the request URL, which may carry an
/// access token in its query string
pub(crate) fn redacted(context: &str, error: reqwest::Error) -> String {
    format!("{context}: {}", error.without_url())
}

/// Tokens returned by a provider's token endpoint. Lives for one callback only.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Performs the authorization-code grant against a provider's token endpoint
#[derive(Clone)]
pub struct TokenExchangeClient {
    http_client: Client,
}

impl TokenExchangeClient {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
        })
    }

    pub async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
    ) -> Result<TokenResponse, AuthError> {
        let client_secret = self.client_secret(provider)?;

        let form = [
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", client_secret.expose_secret()),
        ];

        debug!(provider = %provider.kind, token_url = %provider.token_url, "Exchanging authorization code");

        let response = self
            .http_client
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport {
                provider: provider.kind,
                detail: redacted("token request failed", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Transport {
            provider: provider.kind,
            detail: redacted("failed to read token response", e),
        })?;

        if !status.is_success() {
            warn!(
                provider = %provider.kind,
                status = %status,
                body = %body,
                "Token endpoint rejected authorization code"
            );
            return Err(AuthError::Token {
                provider: provider.kind,
                detail: format!("status {status}"),
            });
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
            warn!(
                provider = %provider.kind,
                status = %status,
                "Token endpoint returned an undecodable body: {}",
                e
            );
            AuthError::Token {
                provider: provider.kind,
                detail: format!("malformed token response: {e}"),
            }
        })
    }

    /// Static secret for Google/Facebook, a freshly minted assertion for Apple
    fn client_secret(&self, provider: &ProviderConfig) -> Result<SecretString, AuthError> {
        match &provider.credentials {
            ClientCredentials::Secret(secret) => Ok(secret.clone()),
            ClientCredentials::AppleKey(key) => {
                mint_client_secret(key, &provider.client_id, Utc::now()).map(SecretString::from)
            }
        }
    }
}
