//! Typed user lifecycle events.
//!
//! Each event kind owns a strongly typed payload schema and a dedicated decode
//! function. Decoding only checks shape (required fields, types, non-empty
//! username); whether the event changes anything is the projection's call.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::envelope::EventEnvelope;
use crate::error::DecodeError;

/// Event kind tags published by the upstream identity service.
pub mod kinds {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const USER_UPDATED_PASSWORD: &str = "user.updated_password";
    pub const USER_ADDED_SCOPE: &str = "user.added_scope";
    pub const USER_DELETED_SCOPE: &str = "user.deleted_scope";
}

/// A decoded, domain-agnostic event.
///
/// Events are facts about upstream state; projections absorb them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event kind identifier (e.g. "user.created").
    fn event_type(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `user.created`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,

    /// Digest computed upstream; never a plaintext.
    #[serde(rename = "password", alias = "credential_digest")]
    pub credential_digest: String,

    pub blocked: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub scopes: Vec<String>,
}

impl core::fmt::Debug for UserCreated {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserCreated")
            .field("username", &self.username)
            .field("credential_digest", &"<redacted>")
            .field("blocked", &self.blocked)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// `user.updated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,
    pub blocked: bool,
}

/// `user.deleted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,
}

/// `user.updated_password`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordUpdated {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,

    #[serde(rename = "password", alias = "credential_digest")]
    pub credential_digest: String,
}

impl core::fmt::Debug for PasswordUpdated {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordUpdated")
            .field("username", &self.username)
            .field("credential_digest", &"<redacted>")
            .finish()
    }
}

/// `user.added_scope` / `user.deleted_scope`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChanged {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,
    pub scope: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tagged event
// ─────────────────────────────────────────────────────────────────────────────

/// Tagged union of every user lifecycle event this service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Created(UserCreated),
    Updated(UserUpdated),
    Deleted(UserDeleted),
    PasswordUpdated(PasswordUpdated),
    ScopeAdded(ScopeChanged),
    ScopeDeleted(ScopeChanged),
    /// A kind this service does not project. Carried so it can be logged.
    Unrecognized { kind: String },
}

impl UserEvent {
    /// Dispatch on the envelope's kind tag and decode its payload.
    ///
    /// Unknown kinds decode successfully to `Unrecognized`.
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, DecodeError> {
        let payload = envelope.payload();
        match envelope.event() {
            kinds::USER_CREATED => decode_created(payload).map(Self::Created),
            kinds::USER_UPDATED => decode_updated(payload).map(Self::Updated),
            kinds::USER_DELETED => decode_deleted(payload).map(Self::Deleted),
            kinds::USER_UPDATED_PASSWORD => {
                decode_password_updated(payload).map(Self::PasswordUpdated)
            }
            kinds::USER_ADDED_SCOPE => {
                decode_scope(kinds::USER_ADDED_SCOPE, payload).map(Self::ScopeAdded)
            }
            kinds::USER_DELETED_SCOPE => {
                decode_scope(kinds::USER_DELETED_SCOPE, payload).map(Self::ScopeDeleted)
            }
            other => Ok(Self::Unrecognized {
                kind: other.to_string(),
            }),
        }
    }

    /// Username the event targets (none for unrecognized kinds).
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Created(e) => Some(&e.username),
            Self::Updated(e) => Some(&e.username),
            Self::Deleted(e) => Some(&e.username),
            Self::PasswordUpdated(e) => Some(&e.username),
            Self::ScopeAdded(e) | Self::ScopeDeleted(e) => Some(&e.username),
            Self::Unrecognized { .. } => None,
        }
    }
}

impl Event for UserEvent {
    fn event_type(&self) -> &str {
        match self {
            Self::Created(_) => kinds::USER_CREATED,
            Self::Updated(_) => kinds::USER_UPDATED,
            Self::Deleted(_) => kinds::USER_DELETED,
            Self::PasswordUpdated(_) => kinds::USER_UPDATED_PASSWORD,
            Self::ScopeAdded(_) => kinds::USER_ADDED_SCOPE,
            Self::ScopeDeleted(_) => kinds::USER_DELETED_SCOPE,
            Self::Unrecognized { kind } => kind,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-kind decoders
// ─────────────────────────────────────────────────────────────────────────────

fn decode_created(payload: &Map<String, Value>) -> Result<UserCreated, DecodeError> {
    let e: UserCreated = from_payload(kinds::USER_CREATED, payload)?;
    require_username(kinds::USER_CREATED, &e.username)?;
    if e.credential_digest.is_empty() {
        return Err(DecodeError::payload(kinds::USER_CREATED, "password digest is empty"));
    }
    Ok(e)
}

fn decode_updated(payload: &Map<String, Value>) -> Result<UserUpdated, DecodeError> {
    let e: UserUpdated = from_payload(kinds::USER_UPDATED, payload)?;
    require_username(kinds::USER_UPDATED, &e.username)?;
    Ok(e)
}

fn decode_deleted(payload: &Map<String, Value>) -> Result<UserDeleted, DecodeError> {
    let e: UserDeleted = from_payload(kinds::USER_DELETED, payload)?;
    require_username(kinds::USER_DELETED, &e.username)?;
    Ok(e)
}

fn decode_password_updated(payload: &Map<String, Value>) -> Result<PasswordUpdated, DecodeError> {
    let e: PasswordUpdated = from_payload(kinds::USER_UPDATED_PASSWORD, payload)?;
    require_username(kinds::USER_UPDATED_PASSWORD, &e.username)?;
    if e.credential_digest.is_empty() {
        return Err(DecodeError::payload(
            kinds::USER_UPDATED_PASSWORD,
            "password digest is empty",
        ));
    }
    Ok(e)
}

fn decode_scope(kind: &'static str, payload: &Map<String, Value>) -> Result<ScopeChanged, DecodeError> {
    let e: ScopeChanged = from_payload(kind, payload)?;
    require_username(kind, &e.username)?;
    if e.scope.trim().is_empty() {
        return Err(DecodeError::payload(kind, "scope is empty"));
    }
    Ok(e)
}

fn from_payload<T>(kind: &'static str, payload: &Map<String, Value>) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(Value::Object(payload.clone()))
        .map_err(|e| DecodeError::payload(kind, e.to_string()))
}

fn require_username(kind: &'static str, username: &str) -> Result<(), DecodeError> {
    if username.trim().is_empty() {
        return Err(DecodeError::payload(kind, "user_name is empty"));
    }
    Ok(())
}

// Upstream serializes an empty scope list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
