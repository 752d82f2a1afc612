//! Projected identity record.
//!
//! An `IdentityRecord` is the local replica of one upstream user. It is only
//! ever created, mutated or destroyed in response to upstream lifecycle events;
//! authentication reads it but never writes it.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::IdentityId;

// ─────────────────────────────────────────────────────────────────────────────
// Identity Record
// ─────────────────────────────────────────────────────────────────────────────

/// The replica of one upstream identity.
///
/// # Invariants
/// - `id` is assigned by the store and never changes.
/// - `username` is unique across the store (enforced by the store, not here).
/// - `credential_digest` is an opaque digest, never a plaintext password.
/// - `scopes` is kept in arrival order; set semantics are applied by the
///   projector through [`IdentityRecord::grant_scope`] / [`IdentityRecord::revoke_scope`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: IdentityId,
    pub username: String,
    pub credential_digest: String,
    pub blocked: bool,
    pub scopes: Vec<String>,
}

impl IdentityRecord {
    /// Add `scope` unless it is already present.
    ///
    /// Returns `true` when the record changed.
    pub fn grant_scope(&mut self, scope: &str) -> bool {
        if self.has_scope(scope) {
            return false;
        }
        self.scopes.push(scope.to_string());
        true
    }

    /// Remove the first occurrence of `scope`.
    ///
    /// Returns `true` when the record changed.
    pub fn revoke_scope(&mut self, scope: &str) -> bool {
        match self.scopes.iter().position(|s| s == scope) {
            Some(idx) => {
                self.scopes.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

// The digest stays out of logs even when a record is debug-printed.
impl core::fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("credential_digest", &"<redacted>")
            .field("blocked", &self.blocked)
            .field("scopes", &self.scopes)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// New Identity
// ─────────────────────────────────────────────────────────────────────────────

/// An identity about to be inserted (the store assigns its id).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    pub username: String,
    pub credential_digest: String,
    pub blocked: bool,
    pub scopes: Vec<String>,
}

impl NewIdentity {
    pub fn new(
        username: impl Into<String>,
        credential_digest: impl Into<String>,
        blocked: bool,
        scopes: Vec<String>,
    ) -> DomainResult<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(DomainError::validation("username must not be empty"));
        }

        Ok(Self {
            username,
            credential_digest: credential_digest.into(),
            blocked,
            scopes,
        })
    }

    /// Attach the store-assigned id.
    pub fn into_record(self, id: IdentityId) -> IdentityRecord {
        IdentityRecord {
            id,
            username: self.username,
            credential_digest: self.credential_digest,
            blocked: self.blocked,
            scopes: self.scopes,
        }
    }
}

impl core::fmt::Debug for NewIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewIdentity")
            .field("username", &self.username)
            .field("credential_digest", &"<redacted>")
            .field("blocked", &self.blocked)
            .field("scopes", &self.scopes)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
