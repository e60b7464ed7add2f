#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{
        Request,
        header::{COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::{
    SecretKey,
    pkcs8::{EncodePrivateKey, LineEnding},
};
use rand::rngs::OsRng;
use secrecy::SecretString;
use social_sso::{
    Config, Server,
    auth::{config::OAuthProvider, oauth::MemoryUserStore},
    cache::CacheManager,
};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use wiremock::MockServer;

pub const BASE_URL: &str = "https://shop.example.com";
pub const APPLE_CLIENT_ID: &str = "com.example.web";

/// Full application wired to mocked provider endpoints
pub struct TestHarness {
    pub server: Server,
    pub app: Router,
    pub users: Arc<MemoryUserStore>,
    pub provider_mock: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        let provider_mock = MockServer::start().await;
        let config = test_config(&provider_mock.uri());
        let users = Arc::new(MemoryUserStore::new());

        let server =
            Server::with_components(config, CacheManager::new_memory(), users.clone()).unwrap();
        let app = server.create_app();

        Self {
            server,
            app,
            users,
            provider_mock,
        }
    }

    pub async fn make_request(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Start a sign-in and return the minted state token
    pub async fn begin(&self, provider: &str) -> String {
        let response = self
            .make_request(
                Request::builder()
                    .uri(format!("/auth/{provider}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        query_value(&location(&response), "state").expect("redirect carries a state token")
    }

    /// Google/Facebook style callback
    pub async fn callback_get(&self, provider: &str, params: &[(&str, &str)]) -> Response {
        self.callback_get_with_cookie(provider, params, None).await
    }

    pub async fn callback_get_with_cookie(
        &self,
        provider: &str,
        params: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> Response {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let mut request = Request::builder().uri(format!("/auth/{provider}/callback?{query}"));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.make_request(request.body(Body::empty()).unwrap()).await
    }

    /// Apple style form POST callback
    pub async fn callback_post(&self, provider: &str, params: &[(&str, &str)]) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        self.make_request(
            Request::builder()
                .method("POST")
                .uri(format!("/auth/{provider}/callback"))
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

fn test_config(mock_uri: &str) -> Config {
    let mut config = Config::default();
    config.logging.log_request = false;
    config.oauth.base_url = BASE_URL.to_string();
    config.session.secure = false;
    config.session.secret = Some(SecretString::from("integration-secret"));

    config.oauth.providers.insert(
        "google".to_string(),
        OAuthProvider {
            enabled: true,
            client_id: Some("google-client".to_string()),
            client_secret: Some(SecretString::from("google-secret")),
            token_url: Some(format!("{mock_uri}/google/token")),
            user_info_url: Some(format!("{mock_uri}/google/userinfo")),
            ..Default::default()
        },
    );
    config.oauth.providers.insert(
        "facebook".to_string(),
        OAuthProvider {
            enabled: true,
            client_id: Some("facebook-app".to_string()),
            client_secret: Some(SecretString::from("facebook-secret")),
            token_url: Some(format!("{mock_uri}/facebook/token")),
            user_info_url: Some(format!(
                "{mock_uri}/facebook/me?fields=id,email,first_name,last_name"
            )),
            ..Default::default()
        },
    );
    config.oauth.providers.insert(
        "apple".to_string(),
        OAuthProvider {
            enabled: true,
            client_id: Some(APPLE_CLIENT_ID.to_string()),
            team_id: Some("TEAM123456".to_string()),
            key_id: Some("KEYID12345".to_string()),
            private_key: Some(SecretString::from(generate_p256_pem())),
            token_url: Some(format!("{mock_uri}/apple/token")),
            ..Default::default()
        },
    );

    config
}

pub fn generate_p256_pem() -> String {
    SecretKey::random(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string()
}

/// An id_token shaped like Apple's (signature is not checked by the service)
pub fn apple_id_token(email: &str) -> String {
    let claims = serde_json::json!({
        "iss": "https://appleid.apple.com",
        "aud": APPLE_CLIENT_ID,
        "sub": "000123.apple-user",
        "iat": chrono::Utc::now().timestamp(),
        "exp": chrono::Utc::now().timestamp() + 600,
        "email": email,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"unrelated"),
    )
    .unwrap()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .expect("redirect has a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string())
}

/// `name=value` pair of a `Set-Cookie` header, ready for a `Cookie` header
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

/// Query parameter of an absolute or site-relative URL
pub fn query_value(url: &str, name: &str) -> Option<String> {
    Url::parse(BASE_URL)
        .unwrap()
        .join(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn notice(response: &Response) -> Option<String> {
    query_value(&location(response), "notice")
}
