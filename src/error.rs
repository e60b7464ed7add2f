use crate::{auth::AuthError, cache::CacheError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(config::ConfigError),
    Cache(CacheError),
    Auth(AuthError),
    Io(std::io::Error),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "Configuration error: {}", err),
            AppError::Cache(err) => write!(f, "Cache error: {}", err),
            AppError::Auth(err) => write!(f, "Authentication error: {}", err),
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self);

        // Detail stays in the log; the body only names the category
        let (status, error_message) = match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
            AppError::Cache(_) => (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable"),
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::Io(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({ "error": error_message }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_app_error_display() {
        let config_err = AppError::Config(config::ConfigError::NotFound("test".to_string()));
        assert!(config_err.to_string().contains("Configuration error"));

        let internal_err = AppError::Internal("test message".to_string());
        assert_eq!(internal_err.to_string(), "Internal error: test message");

        let auth_err: AppError = AuthError::Csrf.into();
        assert_eq!(
            auth_err.to_string(),
            "Authentication error: state verification failed"
        );
    }

    #[test]
    fn test_app_error_from_cache_error() {
        let app_err: AppError = CacheError::Connection("refused".to_string()).into();
        assert!(matches!(app_err, AppError::Cache(_)));
    }

    #[tokio::test]
    async fn test_app_error_into_response_hides_detail() {
        let response = AppError::Internal("secret detail".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(!body.contains("secret detail"));
        assert!(body.contains("Internal server error"));

        let response = AppError::Cache(CacheError::Connection("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::Auth(AuthError::Csrf).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
