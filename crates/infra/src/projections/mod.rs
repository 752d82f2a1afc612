//! Projections (read models) built from upstream events.

pub mod identities;

pub use identities::IdentityProjector;
