//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;

use authreplica_core::{
    CredentialStore, IdentityId, IdentityRecord, NewIdentity, StoreError, StoreResult,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS auth_users (
    id        BIGSERIAL PRIMARY KEY,
    username  TEXT      NOT NULL UNIQUE,
    password  TEXT      NOT NULL,
    blocked   BOOLEAN   NOT NULL DEFAULT FALSE,
    scopes    TEXT[]    NOT NULL DEFAULT '{}'
)
"#;

/// Credential store over the `auth_users` table.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `auth_users` table if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), fields(username = %username), err)]
    async fn get_by_username(&self, username: &str) -> StoreResult<IdentityRecord> {
        let row = sqlx::query(
            "SELECT id, username, password, blocked, scopes FROM auth_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_by_username", e))?
        .ok_or(StoreError::NotFound)?;

        record_from_row(&row)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_by_id(&self, id: IdentityId) -> StoreResult<IdentityRecord> {
        let row = sqlx::query(
            "SELECT id, username, password, blocked, scopes FROM auth_users WHERE id = $1",
        )
        .bind(to_db_id(id)?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_by_id", e))?
        .ok_or(StoreError::NotFound)?;

        record_from_row(&row)
    }

    #[instrument(skip(self, new), fields(username = %new.username), err)]
    async fn create(&self, new: NewIdentity) -> StoreResult<IdentityRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO auth_users (username, password, blocked, scopes)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&new.username)
        .bind(&new.credential_digest)
        .bind(new.blocked)
        .bind(&new.scopes)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("create", e))?;
        Ok(new.into_record(from_db_id(id)?))
    }

    #[instrument(skip(self, record), fields(user_id = %record.id), err)]
    async fn update(&self, record: &IdentityRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE auth_users
            SET username = $2, password = $3, blocked = $4, scopes = $5
            WHERE id = $1
            "#,
        )
        .bind(to_db_id(record.id)?)
        .bind(&record.username)
        .bind(&record.credential_digest)
        .bind(record.blocked)
        .bind(&record.scopes)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete(&self, id: IdentityId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM auth_users WHERE id = $1")
            .bind(to_db_id(id)?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> StoreResult<IdentityRecord> {
    let decode = |e| map_sqlx_error("decode_row", e);
    let id: i64 = row.try_get("id").map_err(decode)?;
    Ok(IdentityRecord {
        id: from_db_id(id)?,
        username: row.try_get("username").map_err(decode)?,
        credential_digest: row.try_get("password").map_err(decode)?,
        blocked: row.try_get("blocked").map_err(decode)?,
        scopes: row.try_get("scopes").map_err(decode)?,
    })
}

// BIGSERIAL is signed; ids above i64::MAX cannot exist in the table.
fn to_db_id(id: IdentityId) -> StoreResult<i64> {
    i64::try_from(id.get()).map_err(|_| StoreError::NotFound)
}

fn from_db_id(id: i64) -> StoreResult<IdentityId> {
    u64::try_from(id)
        .map(IdentityId::new)
        .map_err(|_| StoreError::backend(format!("negative id in auth_users: {id}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
