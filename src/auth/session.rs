use crate::auth::{
    config::SessionConfig,
    error::AuthError,
    oauth::{identity::Identity, providers::ProviderKind},
};
use async_trait::async_trait;
use axum::http::{HeaderMap, header::COOKIE};
use chrono::Utc;
use cookie::{Cookie, SameSite};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{Rng, distributions::Alphanumeric};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub provider: ProviderKind,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly established session and the `Set-Cookie` value delivering it
#[derive(Clone)]
pub struct SessionTicket {
    pub token: String,
    pub set_cookie: String,
}

impl fmt::Debug for SessionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTicket")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Session/cookie issuance used once an identity is resolved
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn establish_session(&self, identity: &Identity) -> Result<SessionTicket, AuthError>;

    /// Claims behind a session token, or `None` when invalid or expired
    async fn authenticate(&self, token: &str) -> Option<SessionClaims>;

    fn cookie_name(&self) -> &str;

    /// `Set-Cookie` value that removes the session cookie
    fn clear_cookie(&self) -> String;
}

/// Session cookie value from request headers, if any
pub fn session_token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// HS256 JWT sessions in an `HttpOnly` cookie
#[derive(Clone)]
pub struct JwtSessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: i64,
    cookie_name: String,
    secure: bool,
}

impl JwtSessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = match config
            .secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
        {
            Some(secret) => secret.clone(),
            None => {
                warn!("No session secret configured, sessions will not survive a restart");
                SecretString::from(
                    rand::thread_rng()
                        .sample_iter(&Alphanumeric)
                        .take(64)
                        .map(char::from)
                        .collect::<String>(),
                )
            }
        };

        let key = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            ttl: config.ttl as i64,
            cookie_name: config.cookie_name.clone(),
            secure: config.secure,
        }
    }

    fn build_cookie(&self, token: String) -> String {
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(cookie::time::Duration::seconds(self.ttl))
            .build()
            .to_string()
    }
}

#[async_trait]
impl SessionManager for JwtSessionManager {
    async fn establish_session(&self, identity: &Identity) -> Result<SessionTicket, AuthError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            provider: identity.last_provider,
            iat: now,
            exp: now + self.ttl,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Session(format!("failed to sign session token: {e}")))?;

        Ok(SessionTicket {
            set_cookie: self.build_cookie(token.clone()),
            token,
        })
    }

    async fn authenticate(&self, token: &str) -> Option<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Ignoring invalid session token: {}", e);
                None
            }
        }
    }

    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn clear_cookie(&self) -> String {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();
        cookie.make_removal();
        cookie.to_string()
    }
}
