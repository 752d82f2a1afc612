use axum::{
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod system;

/// Unauthenticated endpoints.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
}

/// Endpoints that take a refresh token as bearer credential.
pub fn refresh_router() -> Router {
    Router::new().route("/auth/refresh", post(auth::refresh))
}

/// Endpoints that take an access token as bearer credential.
pub fn access_router() -> Router {
    Router::new().route("/auth/whoami", get(system::whoami))
}
