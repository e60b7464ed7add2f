use crate::auth::{
    error::AuthError,
    oauth::{
        apple::APPLE_AUDIENCE,
        providers::{ProviderConfig, ProviderKind},
        token::{TokenResponse, build_http_client, redacted},
    },
};
use email_address::EmailAddress;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Canonical identity shape every provider maps into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookUserInfo {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

/// Claims read from Apple's id_token
#[derive(Debug, Deserialize)]
struct AppleIdClaims {
    email: Option<String>,
}

/// One-time `user` form field Apple posts on the first consent
#[derive(Debug, Default, Deserialize)]
struct AppleUser {
    #[serde(default)]
    name: Option<AppleUserName>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleUserName {
    first_name: Option<String>,
    last_name: Option<String>,
}

/// Maps provider-specific token and profile responses into [`UserProfile`]
#[derive(Clone)]
pub struct ProfileNormalizer {
    http_client: Client,
}

impl ProfileNormalizer {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
        })
    }

    /// Fetch and normalize the profile behind a token response.
    ///
    /// `apple_user` is the raw `user` callback field; it is ignored for other
    /// providers.
    pub async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        tokens: &TokenResponse,
        apple_user: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        match provider.kind {
            ProviderKind::Google => {
                let request = self
                    .http_client
                    .get(profile_url(provider)?)
                    .bearer_auth(&tokens.access_token);
                let info: GoogleUserInfo = self.fetch_json(provider.kind, request).await?;
                normalize(provider.kind, info.email, info.given_name, info.family_name)
            }
            ProviderKind::Facebook => {
                // Graph API takes the token as a query parameter
                let request = self
                    .http_client
                    .get(profile_url(provider)?)
                    .query(&[("access_token", tokens.access_token.as_str())]);
                let info: FacebookUserInfo = self.fetch_json(provider.kind, request).await?;
                normalize(provider.kind, info.email, info.first_name, info.last_name)
            }
            ProviderKind::Apple => {
                let id_token = tokens.id_token.as_deref().ok_or_else(|| AuthError::Profile {
                    provider: ProviderKind::Apple,
                    reason: "token response carried no id_token".to_string(),
                })?;
                let claims = decode_apple_id_token(id_token, &provider.client_id)?;
                let name = parse_apple_user(apple_user).name.unwrap_or_default();
                normalize(
                    ProviderKind::Apple,
                    claims.email,
                    name.first_name,
                    name.last_name,
                )
            }
        }
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(
        &self,
        kind: ProviderKind,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AuthError> {
        let response = request.send().await.map_err(|e| AuthError::Transport {
            provider: kind,
            detail: redacted("profile request failed", e),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Transport {
            provider: kind,
            detail: redacted("failed to read profile response", e),
        })?;

        if !status.is_success() {
            warn!(provider = %kind, status = %status, body = %body, "Profile request failed");
            return Err(AuthError::Transport {
                provider: kind,
                detail: format!("profile endpoint returned status {status}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(provider = %kind, "Malformed profile response: {}", e);
            AuthError::Profile {
                provider: kind,
                reason: format!("malformed profile response: {e}"),
            }
        })
    }
}

fn profile_url(provider: &ProviderConfig) -> Result<&str, AuthError> {
    provider
        .profile_url
        .as_deref()
        .ok_or_else(|| AuthError::configuration(provider.kind.as_str(), "missing user_info_url"))
}

/// Decode Apple's id_token and check its standard claims.
///
/// The signature is NOT verified against Apple's published keys.
fn decode_apple_id_token(id_token: &str, client_id: &str) -> Result<AppleIdClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.set_issuer(&[APPLE_AUDIENCE]);
    validation.set_audience(&[client_id]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);

    decode::<AppleIdClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Profile {
            provider: ProviderKind::Apple,
            reason: format!("id_token rejected: {e}"),
        })
}

/// Missing or malformed `user` fields are normal on repeat logins
fn parse_apple_user(raw: Option<&str>) -> AppleUser {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return AppleUser::default();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!("Ignoring undecodable Apple user field: {}", e);
        AppleUser::default()
    })
}

fn normalize(
    kind: ProviderKind,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<UserProfile, AuthError> {
    let email = email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AuthError::Profile {
            provider: kind,
            reason: "no email address in profile".to_string(),
        })?;

    if !EmailAddress::is_valid(&email) {
        return Err(AuthError::Profile {
            provider: kind,
            reason: "email address is not valid".to_string(),
        });
    }

    Ok(UserProfile {
        email,
        first_name: first_name.map(|n| n.trim().to_string()).unwrap_or_default(),
        last_name: last_name.map(|n| n.trim().to_string()).unwrap_or_default(),
    })
}
