//! Credential store contract.
//!
//! The store is the persistence boundary of the replica. Each operation is
//! individually atomic and scoped to a single record; no multi-record
//! transactions are offered or needed.
//!
//! Read-modify-write sequences built on top of two separate calls (for example
//! `get_by_username` followed by `update`) are not isolated from concurrent
//! writers. Two concurrent scope changes on the same identity can lose one
//! update; callers accept that window.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::id::IdentityId;
use crate::identity::{IdentityRecord, NewIdentity};

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential store operation error.
///
/// `NotFound` and `Conflict` are the two kinds callers are expected to branch
/// on; everything else is a `Backend` failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("identity not found")]
    NotFound,

    /// A unique constraint (username) rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Transactional CRUD over the identity projection.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_username(&self, username: &str) -> StoreResult<IdentityRecord>;

    async fn get_by_id(&self, id: IdentityId) -> StoreResult<IdentityRecord>;

    /// Insert a new identity and return it with its assigned id.
    ///
    /// Fails with `Conflict` when the username is already taken.
    async fn create(&self, identity: NewIdentity) -> StoreResult<IdentityRecord>;

    /// Overwrite the stored row with the same id.
    async fn update(&self, record: &IdentityRecord) -> StoreResult<()>;

    async fn delete(&self, id: IdentityId) -> StoreResult<()>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn get_by_username(&self, username: &str) -> StoreResult<IdentityRecord> {
        (**self).get_by_username(username).await
    }

    async fn get_by_id(&self, id: IdentityId) -> StoreResult<IdentityRecord> {
        (**self).get_by_id(id).await
    }

    async fn create(&self, identity: NewIdentity) -> StoreResult<IdentityRecord> {
        (**self).create(identity).await
    }

    async fn update(&self, record: &IdentityRecord) -> StoreResult<()> {
        (**self).update(record).await
    }

    async fn delete(&self, id: IdentityId) -> StoreResult<()> {
        (**self).delete(id).await
    }
}
