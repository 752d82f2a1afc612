//! HTTP API: configuration, service wiring, routing, and request/response mapping.

pub mod app;
pub mod config;
pub mod middleware;
