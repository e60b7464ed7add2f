use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::info;

/// One structured line per `/auth` request and response.
///
/// Only the path is logged; query strings carry codes and state tokens.
pub async fn request_response_logger(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if !path.starts_with("/auth") {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        method = %method,
        path = %path,
        ip = %ip,
        "Auth request"
    );

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        latency_ms = %duration.as_millis(),
        "Auth response"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_logger_passes_responses_through() {
        let app = Router::new()
            .route("/auth/ping", get(|| async { "pong" }))
            .route("/other", get(|| async { StatusCode::IM_A_TEAPOT }))
            .layer(middleware::from_fn(request_response_logger));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/auth/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
