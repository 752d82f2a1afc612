//! Identity replica projection.
//!
//! Folds `user.*` lifecycle events into the credential store. Every handler is
//! idempotent and tombstone-safe: events for identities the replica does not
//! hold are skipped rather than failed.

use async_trait::async_trait;
use tracing::{debug, info};

use authreplica_core::{CredentialStore, IdentityRecord, NewIdentity, StoreError};
use authreplica_events::{
    Event, PasswordUpdated, Projection, ProjectionError, ProjectionOutcome, ScopeChanged,
    SkipReason, UserCreated, UserDeleted, UserEvent, UserUpdated, kinds,
};

/// Projects user lifecycle events into a [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct IdentityProjector<S> {
    store: S,
}

impl<S> IdentityProjector<S>
where
    S: CredentialStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn created(&self, e: &UserCreated) -> Result<ProjectionOutcome, ProjectionError> {
        let mut scopes: Vec<String> = Vec::with_capacity(e.scopes.len());
        for scope in &e.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }

        let new = NewIdentity::new(&e.username, &e.credential_digest, e.blocked, scopes)
            .map_err(|err| ProjectionError::domain(kinds::USER_CREATED, err))?;

        match self.store.create(new).await {
            Ok(record) => {
                info!(username = %record.username, user_id = %record.id, "identity created");
                Ok(ProjectionOutcome::Applied)
            }
            Err(StoreError::Conflict(_)) => {
                debug!(username = %e.username, "identity already exists; create treated as applied");
                Ok(ProjectionOutcome::AlreadyApplied)
            }
            Err(err) => Err(ProjectionError::store(kinds::USER_CREATED, err)),
        }
    }

    async fn updated(&self, e: &UserUpdated) -> Result<ProjectionOutcome, ProjectionError> {
        let kind = kinds::USER_UPDATED;
        let Some(mut record) = self.lookup(kind, &e.username).await? else {
            return Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing));
        };
        if record.blocked == e.blocked {
            return Ok(ProjectionOutcome::Skipped(SkipReason::NoChange));
        }
        record.blocked = e.blocked;
        self.write(kind, &record).await
    }

    async fn deleted(&self, e: &UserDeleted) -> Result<ProjectionOutcome, ProjectionError> {
        let kind = kinds::USER_DELETED;
        let Some(record) = self.lookup(kind, &e.username).await? else {
            return Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing));
        };

        match self.store.delete(record.id).await {
            Ok(()) => {
                info!(username = %record.username, user_id = %record.id, "identity deleted");
                Ok(ProjectionOutcome::Applied)
            }
            Err(StoreError::NotFound) => Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing)),
            Err(err) => Err(ProjectionError::store(kind, err)),
        }
    }

    async fn password_updated(
        &self,
        e: &PasswordUpdated,
    ) -> Result<ProjectionOutcome, ProjectionError> {
        let kind = kinds::USER_UPDATED_PASSWORD;
        let Some(mut record) = self.lookup(kind, &e.username).await? else {
            return Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing));
        };
        if record.credential_digest == e.credential_digest {
            return Ok(ProjectionOutcome::Skipped(SkipReason::NoChange));
        }
        record.credential_digest = e.credential_digest.clone();
        self.write(kind, &record).await
    }

    async fn scope_added(&self, e: &ScopeChanged) -> Result<ProjectionOutcome, ProjectionError> {
        let kind = kinds::USER_ADDED_SCOPE;
        let Some(mut record) = self.lookup(kind, &e.username).await? else {
            return Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing));
        };
        if !record.grant_scope(&e.scope) {
            return Ok(ProjectionOutcome::Skipped(SkipReason::NoChange));
        }
        self.write(kind, &record).await
    }

    async fn scope_deleted(&self, e: &ScopeChanged) -> Result<ProjectionOutcome, ProjectionError> {
        let kind = kinds::USER_DELETED_SCOPE;
        let Some(mut record) = self.lookup(kind, &e.username).await? else {
            return Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing));
        };
        if !record.revoke_scope(&e.scope) {
            return Ok(ProjectionOutcome::Skipped(SkipReason::NoChange));
        }
        self.write(kind, &record).await
    }

    async fn lookup(
        &self,
        kind: &'static str,
        username: &str,
    ) -> Result<Option<IdentityRecord>, ProjectionError> {
        match self.store.get_by_username(username).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::NotFound) => {
                debug!(event = kind, username, "identity not in replica; skipping");
                Ok(None)
            }
            Err(err) => Err(ProjectionError::store(kind, err)),
        }
    }

    // The record may vanish between lookup and write; that is a skip.
    async fn write(
        &self,
        kind: &'static str,
        record: &IdentityRecord,
    ) -> Result<ProjectionOutcome, ProjectionError> {
        match self.store.update(record).await {
            Ok(()) => {
                info!(event = kind, username = %record.username, user_id = %record.id, "identity updated");
                Ok(ProjectionOutcome::Applied)
            }
            Err(StoreError::NotFound) => Ok(ProjectionOutcome::Skipped(SkipReason::IdentityMissing)),
            Err(err) => Err(ProjectionError::store(kind, err)),
        }
    }
}

#[async_trait]
impl<S> Projection for IdentityProjector<S>
where
    S: CredentialStore,
{
    type Ev = UserEvent;

    async fn apply(&self, event: &UserEvent) -> Result<ProjectionOutcome, ProjectionError> {
        match event {
            UserEvent::Created(e) => self.created(e).await,
            UserEvent::Updated(e) => self.updated(e).await,
            UserEvent::Deleted(e) => self.deleted(e).await,
            UserEvent::PasswordUpdated(e) => self.password_updated(e).await,
            UserEvent::ScopeAdded(e) => self.scope_added(e).await,
            UserEvent::ScopeDeleted(e) => self.scope_deleted(e).await,
            UserEvent::Unrecognized { .. } => {
                info!(event = event.event_type(), "ignoring unrecognized event kind");
                Ok(ProjectionOutcome::Ignored)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
