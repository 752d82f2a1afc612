use thiserror::Error;

use authreplica_core::{DomainError, StoreError};

/// Failure to turn message bytes into a typed event.
///
/// Always reported per message; never fatal to a consumer loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes are not a `{event, payload}` JSON envelope.
    #[error("malformed event envelope: {0}")]
    Envelope(String),

    /// The payload does not match the schema of its event kind.
    #[error("invalid payload for '{kind}': {reason}")]
    Payload { kind: &'static str, reason: String },
}

impl DecodeError {
    pub fn payload(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Payload {
            kind,
            reason: reason.into(),
        }
    }
}

/// A projection could not apply an event.
///
/// Business no-ops (unknown identity, duplicate create) are outcomes, not errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("store failure while projecting '{kind}': {source}")]
    Store {
        kind: &'static str,
        #[source]
        source: StoreError,
    },

    /// The decoded event still violated an identity invariant.
    #[error("event '{kind}' rejected by the identity model: {source}")]
    Domain {
        kind: &'static str,
        #[source]
        source: DomainError,
    },
}

impl ProjectionError {
    pub fn store(kind: &'static str, source: StoreError) -> Self {
        Self::Store { kind, source }
    }

    pub fn domain(kind: &'static str, source: DomainError) -> Self {
        Self::Domain { kind, source }
    }
}
