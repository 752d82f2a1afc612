//! HS256 token issuance.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use thiserror::Error;

use authreplica_core::IdentityRecord;

use crate::claims::{AccessClaims, RefreshClaims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Validity periods for issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenLifetimes {
    pub const DEFAULT_ACCESS: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_REFRESH: Duration = Duration::from_secs(7 * 24 * 60 * 60);
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Self::DEFAULT_ACCESS,
            refresh: Self::DEFAULT_REFRESH,
        }
    }
}

/// Signs access and refresh tokens with one shared symmetric secret.
///
/// The secret is fixed for the lifetime of the issuer.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>, lifetimes: TokenLifetimes) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret),
            lifetimes,
        })
    }

    pub fn issue_access_token(&self, record: &IdentityRecord) -> Result<String, TokenError> {
        self.issue_access_token_at(record, Utc::now())
    }

    /// Sign an access token as if issued at `now`.
    pub fn issue_access_token_at(
        &self,
        record: &IdentityRecord,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = AccessClaims::for_record(record, iat, expiry(iat, self.lifetimes.access));
        self.sign(&claims)
    }

    pub fn issue_refresh_token(&self, record: &IdentityRecord) -> Result<String, TokenError> {
        self.issue_refresh_token_at(record, Utc::now())
    }

    /// Sign a refresh token as if issued at `now`.
    pub fn issue_refresh_token_at(
        &self,
        record: &IdentityRecord,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = RefreshClaims {
            sub: record.id,
            iat,
            exp: expiry(iat, self.lifetimes.refresh),
        };
        self.sign(&claims)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .field("lifetimes", &self.lifetimes)
            .finish()
    }
}

fn expiry(iat: i64, lifetime: Duration) -> i64 {
    let secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
    iat.saturating_add(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authreplica_core::IdentityId;
    use chrono::TimeZone;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    const SECRET: &[u8] = b"test-secret";

    fn alice() -> IdentityRecord {
        IdentityRecord {
            id: IdentityId::new(7),
            username: "alice".into(),
            credential_digest: "digest".into(),
            blocked: true,
            scopes: vec!["read".into(), "write".into()],
        }
    }

    fn raw_claims(token: &str) -> serde_json::Value {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        decode::<serde_json::Value>(token, &DecodingKey::from_secret(SECRET), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn rejects_empty_secret() {
        let err = TokenIssuer::new(b"", TokenLifetimes::default()).unwrap_err();
        assert_eq!(err, TokenError::EmptySecret);
    }

    #[test]
    fn access_token_carries_identity_snapshot() {
        let issuer = TokenIssuer::new(SECRET, TokenLifetimes::default()).unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let token = issuer.issue_access_token_at(&alice(), now).unwrap();
        let claims = raw_claims(&token);

        assert_eq!(claims["sub"], 7);
        assert_eq!(claims["blocked"], true);
        assert_eq!(claims["scopes"], serde_json::json!(["read", "write"]));
        assert_eq!(claims["iat"], 1_700_000_000);
        assert_eq!(claims["exp"], 1_700_000_000 + 15 * 60);
    }

    #[test]
    fn refresh_token_carries_only_subject_and_timing() {
        let issuer = TokenIssuer::new(SECRET, TokenLifetimes::default()).unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let token = issuer.issue_refresh_token_at(&alice(), now).unwrap();
        let claims = raw_claims(&token);

        assert_eq!(claims["sub"], 7);
        assert_eq!(claims["exp"], 1_700_000_000 + 7 * 24 * 60 * 60);
        assert!(claims.get("scopes").is_none());
        assert!(claims.get("blocked").is_none());
    }

    #[test]
    fn honors_configured_lifetimes() {
        let lifetimes = TokenLifetimes {
            access: Duration::from_secs(60),
            refresh: Duration::from_secs(120),
        };
        let issuer = TokenIssuer::new(SECRET, lifetimes).unwrap();
        let now = Utc.timestamp_opt(1_000, 0).unwrap();

        let access = raw_claims(&issuer.issue_access_token_at(&alice(), now).unwrap());
        let refresh = raw_claims(&issuer.issue_refresh_token_at(&alice(), now).unwrap());

        assert_eq!(access["exp"], 1_060);
        assert_eq!(refresh["exp"], 1_120);
    }
}
