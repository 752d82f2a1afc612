//! `authreplica-core` — identity replica building blocks.
//!
//! This crate contains the projected identity model and the storage contract
//! (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod identity;
pub mod store;

pub use error::{DomainError, DomainResult};
pub use id::IdentityId;
pub use identity::{IdentityRecord, NewIdentity};
pub use store::{CredentialStore, StoreError, StoreResult};
