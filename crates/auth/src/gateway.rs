//! Login and refresh on top of the projected credential store.
//!
//! The gateway only reads the store. It never creates or mutates identities.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use authreplica_core::{CredentialStore, IdentityId, StoreError};

use crate::issuer::TokenIssuer;
use crate::password::PasswordVerifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user is blocked")]
    Blocked,

    /// Store, digest or signing failure. The message is for logs only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// How login treats identities flagged as blocked upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Refuse to issue tokens to blocked identities.
    ///
    /// When unset, tokens are issued and the access token carries `blocked = true`
    /// for downstream services to act on.
    pub reject_blocked: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl core::fmt::Debug for LoginTokens {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Authenticates against the credential replica and mints tokens.
pub struct AuthGateway<S, P> {
    store: S,
    passwords: Arc<P>,
    issuer: TokenIssuer,
    policy: LoginPolicy,
}

impl<S, P> AuthGateway<S, P>
where
    S: CredentialStore,
    P: PasswordVerifier,
{
    pub fn new(store: S, passwords: P, issuer: TokenIssuer, policy: LoginPolicy) -> Self {
        Self {
            store,
            passwords: Arc::new(passwords),
            issuer,
            policy,
        }
    }

    /// Verify `username`/`password` and issue an access + refresh token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginTokens, AuthError> {
        let record = match self.store.get_by_username(username).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                info!(username, "login rejected: user not found");
                return Err(AuthError::UserNotFound);
            }
            Err(err) => {
                error!(username, error = %err, "login failed: store lookup");
                return Err(AuthError::internal(err.to_string()));
            }
        };

        // bcrypt is CPU-bound.
        let passwords = Arc::clone(&self.passwords);
        let plaintext = password.to_owned();
        let digest = record.credential_digest.clone();
        let verified = tokio::task::spawn_blocking(move || passwords.verify(&plaintext, &digest))
            .await
            .map_err(|e| {
                error!(username, error = %e, "login failed: password check task");
                AuthError::internal(e.to_string())
            })?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                info!(username, user_id = %record.id, "login rejected: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                error!(username, user_id = %record.id, error = %err, "login failed: stored digest unusable");
                return Err(AuthError::internal(err.to_string()));
            }
        }

        if record.blocked && self.policy.reject_blocked {
            warn!(username, user_id = %record.id, "login rejected: user is blocked");
            return Err(AuthError::Blocked);
        }

        let access_token = self.issuer.issue_access_token(&record).map_err(|e| {
            error!(user_id = %record.id, error = %e, "login failed: access token signing");
            AuthError::internal(e.to_string())
        })?;
        let refresh_token = self.issuer.issue_refresh_token(&record).map_err(|e| {
            error!(user_id = %record.id, error = %e, "login failed: refresh token signing");
            AuthError::internal(e.to_string())
        })?;

        info!(username, user_id = %record.id, blocked = record.blocked, "login succeeded");
        Ok(LoginTokens {
            access_token,
            refresh_token,
        })
    }

    /// Re-issue an access token from the current state of `user_id`.
    ///
    /// The refresh token itself is not rotated. Under `reject_blocked`, an
    /// identity blocked since login gets `Blocked` here too.
    pub async fn refresh_token(&self, user_id: IdentityId) -> Result<String, AuthError> {
        let record = self.store.get_by_id(user_id).await.map_err(|err| {
            error!(user_id = %user_id, error = %err, "refresh failed: store lookup");
            AuthError::internal(err.to_string())
        })?;

        if record.blocked && self.policy.reject_blocked {
            warn!(user_id = %user_id, "refresh rejected: user is blocked");
            return Err(AuthError::Blocked);
        }

        let token = self.issuer.issue_access_token(&record).map_err(|e| {
            error!(user_id = %user_id, error = %e, "refresh failed: access token signing");
            AuthError::internal(e.to_string())
        })?;

        info!(user_id = %user_id, "access token refreshed");
        Ok(token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
