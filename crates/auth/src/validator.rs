//! Verification of tokens minted by [`crate::TokenIssuer`].

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::de::DeserializeOwned;

use crate::claims::{AccessClaims, RefreshClaims, TokenValidationError, validate_window};

/// Decodes and verifies bearer tokens at the HTTP boundary.
pub trait JwtValidator: Send + Sync {
    fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenValidationError>;

    fn validate_refresh(&self, token: &str) -> Result<RefreshClaims, TokenValidationError>;
}

/// HS256 validator sharing the issuer's secret.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn decode_access_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, TokenValidationError> {
        let claims: AccessClaims = self.decode(token)?;
        validate_window(claims.iat, claims.exp, now)?;
        Ok(claims)
    }

    pub fn decode_refresh_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims, TokenValidationError> {
        let claims: RefreshClaims = self.decode(token)?;
        validate_window(claims.iat, claims.exp, now)?;
        Ok(claims)
    }

    // Signature and algorithm only; the time window is checked against an
    // explicit clock by the caller.
    fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        decode::<C>(token, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            })
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenValidationError> {
        self.decode_access_at(token, Utc::now())
    }

    fn validate_refresh(&self, token: &str) -> Result<RefreshClaims, TokenValidationError> {
        self.decode_refresh_at(token, Utc::now())
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").field("key", &"<redacted>").finish()
    }
}
