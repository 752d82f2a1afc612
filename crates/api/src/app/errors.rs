use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use authreplica_auth::AuthError;

/// Map a gateway failure to its HTTP rendering.
///
/// Unknown users and wrong passwords look the same to clients.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::UserNotFound | AuthError::InvalidCredentials => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid username or password",
        ),
        AuthError::Blocked => json_error(StatusCode::FORBIDDEN, "user_blocked", "user is blocked"),
        AuthError::Internal(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal server error",
        ),
    }
}

pub fn timeout_response() -> axum::response::Response {
    json_error(
        StatusCode::GATEWAY_TIMEOUT,
        "timeout",
        "request did not complete in time",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
