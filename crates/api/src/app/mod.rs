//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, event source, projection worker and gateway
//! - `routes/`: HTTP handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router over already-wired services.
pub fn build_router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: Arc::clone(&services.validator),
    };

    let refresh = routes::refresh_router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::refresh_token_middleware,
    ));

    let access = routes::access_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::access_token_middleware,
    ));

    routes::public_router()
        .merge(refresh)
        .merge(access)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Wire services from `config` and build the router (used by tests).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, Arc<AppServices>)> {
    let services = services::build_services(config).await?;
    Ok((build_router(Arc::clone(&services)), services))
}
