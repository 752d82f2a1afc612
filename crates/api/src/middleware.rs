use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use authreplica_auth::JwtValidator;

use crate::app::errors::json_error;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Require a valid access token; exposes its `AccessClaims` to handlers.
pub async fn access_token_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate_access(token).map_err(|e| {
        tracing::debug!(error = %e, "access token rejected");
        unauthorized("invalid or expired access token")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Require a valid refresh token; exposes its `RefreshClaims` to handlers.
pub async fn refresh_token_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate_refresh(token).map_err(|e| {
        tracing::debug!(error = %e, "refresh token rejected");
        unauthorized("invalid or expired refresh token")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn unauthorized(message: &'static str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, Response> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let header = header
        .to_str()
        .map_err(|_| unauthorized("malformed authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("missing bearer token"))?
        .trim();

    if token.is_empty() {
        return Err(unauthorized("missing bearer token"));
    }

    Ok(token)
}
