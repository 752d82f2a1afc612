//! Password digests.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// The stored digest could not be parsed or compared.
    #[error("password digest error: {0}")]
    Digest(String),
}

/// Checks a plaintext against a stored digest.
///
/// `Ok(false)` is a mismatch; `Err` means the digest itself is unusable.
pub trait PasswordVerifier: Send + Sync + 'static {
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError>;
}

/// Produces digests compatible with a [`PasswordVerifier`].
pub trait PasswordHasher: Send + Sync + 'static {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;
}

/// bcrypt digests (`$2a$`/`$2b$`/`$2y$`).
#[derive(Debug, Clone, Copy)]
pub struct BcryptPasswords {
    cost: u32,
}

impl BcryptPasswords {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptPasswords {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordVerifier for BcryptPasswords {
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
        bcrypt::verify(plaintext, digest).map_err(|e| PasswordError::Digest(e.to_string()))
    }
}

impl PasswordHasher for BcryptPasswords {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| PasswordError::Digest(e.to_string()))
    }
}
