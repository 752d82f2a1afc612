use axum::{extract::Extension, response::IntoResponse, Json};

use authreplica_auth::AccessClaims;

use crate::app::dto::WhoAmIResponse;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Echo the verified access-token claims back to the caller.
pub async fn whoami(Extension(claims): Extension<AccessClaims>) -> impl IntoResponse {
    Json(WhoAmIResponse {
        user_id: claims.sub.get(),
        blocked: claims.blocked,
        scopes: claims.scopes,
        expires_at: claims.exp,
    })
}
