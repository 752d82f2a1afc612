//! Strongly-typed identifiers used across the replica.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a projected identity.
///
/// Numeric and assigned by the credential store when the identity is first
/// projected. It is the `sub` claim of every issued token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(u64);

impl IdentityId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for IdentityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<IdentityId> for u64 {
    fn from(value: IdentityId) -> Self {
        value.0
    }
}

impl FromStr for IdentityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|e| DomainError::invalid_id(format!("IdentityId: {}", e)))?;
        Ok(Self(value))
    }
}
