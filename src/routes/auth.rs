use crate::{
    auth::{
        oauth::{CallbackParams, FlowRedirect, ProvidersResponse},
        session::session_token_from_headers,
    },
    error::AppError,
    server::Server,
};
use axum::{
    Form, Router,
    extract::{
        Path, Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};

pub fn create_auth_routes() -> Router<Server> {
    Router::new()
        .route("/providers", get(providers_handler))
        .route("/logout", post(logout_handler))
        .route("/{provider}", get(authorize_handler))
        .route(
            "/{provider}/callback",
            get(callback_query_handler).post(callback_form_handler),
        )
}

pub async fn providers_handler(State(server): State<Server>) -> Json<ProvidersResponse> {
    Json(server.oauth_flows.list_providers())
}

/// Redirect the browser to the provider's consent page
pub async fn authorize_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
) -> Result<Response, AppError> {
    let redirect = server.oauth_flows.begin_authorization(&provider).await;
    found(redirect)
}

/// Google and Facebook return with query parameters
pub async fn callback_query_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, AppError> {
    match params {
        Ok(Query(params)) => callback(server, provider, headers, params).await,
        Err(rejection) => found(
            server
                .oauth_flows
                .reject_callback(&provider, &rejection.body_text()),
        ),
    }
}

/// Apple returns with a form POST (`response_mode=form_post`)
pub async fn callback_form_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    params: Result<Form<CallbackParams>, FormRejection>,
) -> Result<Response, AppError> {
    match params {
        Ok(Form(params)) => callback(server, provider, headers, params).await,
        Err(rejection) => found(
            server
                .oauth_flows
                .reject_callback(&provider, &rejection.body_text()),
        ),
    }
}

async fn callback(
    server: Server,
    provider: String,
    headers: HeaderMap,
    params: CallbackParams,
) -> Result<Response, AppError> {
    let flows = &server.oauth_flows;
    let session_token = session_token_from_headers(&headers, flows.sessions().cookie_name());

    let redirect = flows
        .handle_callback(&provider, params, session_token.as_deref())
        .await;
    found(redirect)
}

pub async fn logout_handler(State(server): State<Server>) -> Result<Response, AppError> {
    let flows = &server.oauth_flows;
    let mut response = found(FlowRedirect {
        location: flows.login_url().to_string(),
        session: None,
    })?;
    response
        .headers_mut()
        .append(SET_COOKIE, header_value(&flows.sessions().clear_cookie())?);
    Ok(response)
}

/// `302 Found`, carrying the session cookie when one was established
fn found(redirect: FlowRedirect) -> Result<Response, AppError> {
    let mut response = (StatusCode::FOUND, [(LOCATION, header_value(&redirect.location)?)])
        .into_response();

    if let Some(ticket) = redirect.session {
        response
            .headers_mut()
            .append(SET_COOKIE, header_value(&ticket.set_cookie)?);
    }
    Ok(response)
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(format!("Invalid header value: {e}")))
}
