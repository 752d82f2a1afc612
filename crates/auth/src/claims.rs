use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use authreplica_core::{IdentityId, IdentityRecord};

/// Claims carried by an access token.
///
/// A snapshot of the identity at issuance time; later projection changes only
/// show up in tokens issued afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: numeric identity id.
    pub sub: IdentityId,

    pub blocked: bool,

    pub scopes: Vec<String>,

    /// Issued-at, Unix seconds.
    pub iat: i64,

    /// Expiry, Unix seconds.
    pub exp: i64,
}

impl AccessClaims {
    pub fn for_record(record: &IdentityRecord, iat: i64, exp: i64) -> Self {
        Self {
            sub: record.id,
            blocked: record.blocked,
            scopes: record.scopes.clone(),
            iat,
            exp,
        }
    }
}

/// Claims carried by a refresh token: subject and timing only.
///
/// Unknown fields are rejected so an access token never passes as a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub sub: IdentityId,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Deterministically validate a token's time window against `now`.
pub fn validate_window(iat: i64, exp: i64, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if exp <= iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
