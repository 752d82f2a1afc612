use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use authreplica_core::{
    CredentialStore, IdentityId, IdentityRecord, NewIdentity, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct Rows {
    by_id: HashMap<IdentityId, IdentityRecord>,
    by_username: HashMap<String, IdentityId>,
    last_id: u64,
}

/// In-memory credential store.
///
/// Intended for tests/dev. Username uniqueness is enforced the same way the
/// Postgres table's unique index does.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    rows: RwLock<Rows>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::backend("lock poisoned")
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_by_username(&self, username: &str) -> StoreResult<IdentityRecord> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.by_username
            .get(username)
            .and_then(|id| rows.by_id.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: IdentityId) -> StoreResult<IdentityRecord> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.by_id.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, new: NewIdentity) -> StoreResult<IdentityRecord> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.by_username.contains_key(&new.username) {
            return Err(StoreError::conflict(format!(
                "username '{}' already exists",
                new.username
            )));
        }

        rows.last_id += 1;
        let record = new.into_record(IdentityId::new(rows.last_id));
        rows.by_username.insert(record.username.clone(), record.id);
        rows.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &IdentityRecord) -> StoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let previous_username = match rows.by_id.get(&record.id) {
            Some(existing) => existing.username.clone(),
            None => return Err(StoreError::NotFound),
        };

        if previous_username != record.username {
            if rows.by_username.contains_key(&record.username) {
                return Err(StoreError::conflict(format!(
                    "username '{}' already exists",
                    record.username
                )));
            }
            rows.by_username.remove(&previous_username);
            rows.by_username.insert(record.username.clone(), record.id);
        }

        rows.by_id.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: IdentityId) -> StoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let removed = rows.by_id.remove(&id).ok_or(StoreError::NotFound)?;
        rows.by_username.remove(&removed.username);
        Ok(())
    }
}
