use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use authreplica_auth::RefreshClaims;

use crate::app::dto::{LoginRequest, LoginResponse, RefreshResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            );
        }
    };

    if body.username.trim().is_empty() || body.password.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "user_name and password are required",
        );
    }

    let attempt = services.gateway.login(&body.username, &body.password);
    match tokio::time::timeout(services.request_timeout, attempt).await {
        Ok(Ok(tokens)) => (StatusCode::OK, Json(LoginResponse::from(tokens))).into_response(),
        Ok(Err(e)) => errors::auth_error_to_response(e),
        Err(_) => {
            tracing::warn!(username = %body.username, "login timed out");
            errors::timeout_response()
        }
    }
}

/// Mint a fresh access token for the subject of a valid refresh token.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(claims): Extension<RefreshClaims>,
) -> axum::response::Response {
    let attempt = services.gateway.refresh_token(claims.sub);
    match tokio::time::timeout(services.request_timeout, attempt).await {
        Ok(Ok(access_token)) => (StatusCode::OK, Json(RefreshResponse { access_token })).into_response(),
        Ok(Err(e)) => errors::auth_error_to_response(e),
        Err(_) => {
            tracing::warn!(user_id = %claims.sub, "refresh timed out");
            errors::timeout_response()
        }
    }
}
