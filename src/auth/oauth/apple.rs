//! Sign in with Apple client assertion
//!
//! Apple does not accept a static client secret. Each token request carries a
//! short-lived ES256 JWS signed with the team's private key instead.

use crate::auth::{
    error::AuthError,
    oauth::{
        der::{P256_COMPONENT_LEN, der_to_raw},
        providers::{AppleSigningKey, ProviderKind},
    },
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use p256::{
    SecretKey,
    ecdsa::{DerSignature, SigningKey, signature::Signer},
    pkcs8::DecodePrivateKey,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

/// Audience of every client assertion and issuer of every Apple id_token
pub const APPLE_AUDIENCE: &str = "https://appleid.apple.com";

/// Lifetime of a minted client secret
pub const CLIENT_SECRET_LIFETIME_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientSecretHeader {
    pub alg: String,
    pub kid: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientSecretClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub sub: String,
}

/// Mint a fresh client secret for the Apple token endpoint.
///
/// Never cache the result: `iat`/`exp` make it valid for five minutes only.
pub fn mint_client_secret(
    key: &AppleSigningKey,
    client_id: &str,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let header = ClientSecretHeader {
        alg: "ES256".to_string(),
        kid: key.key_id.clone(),
    };
    let iat = now.timestamp();
    let claims = ClientSecretClaims {
        iss: key.team_id.clone(),
        iat,
        exp: iat + CLIENT_SECRET_LIFETIME_SECS,
        aud: APPLE_AUDIENCE.to_string(),
        sub: client_id.to_string(),
    };

    let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);

    let signing_key = parse_signing_key(key.private_key.expose_secret())?;
    let signature: DerSignature = signing_key.sign(signing_input.as_bytes());
    let raw = der_to_raw(signature.as_bytes(), P256_COMPONENT_LEN)
        .map_err(|e| signing_error(format!("signature encoding: {e}")))?;

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(raw)))
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| signing_error(format!("failed to serialize JWS segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Accept Apple's `.p8` PKCS#8 export as well as SEC1 `EC PRIVATE KEY` PEM
fn parse_signing_key(pem: &str) -> Result<SigningKey, AuthError> {
    let pem = pem.trim();
    if let Ok(key) = SigningKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    SecretKey::from_sec1_pem(pem)
        .map(SigningKey::from)
        .map_err(|_| signing_error("private key is not a P-256 PKCS#8 or SEC1 PEM"))
}

// Key problems only show up at exchange time; the detail never carries key material
fn signing_error(detail: impl Into<String>) -> AuthError {
    AuthError::Token {
        provider: ProviderKind::Apple,
        detail: format!("client secret signing failed: {}", detail.into()),
    }
}
