//! Infrastructure layer: credential stores, the identity projection, workers
//! and event sources.

pub mod event_bus;
pub mod projections;
pub mod store;
pub mod workers;

#[cfg(test)]
mod integration_tests;
