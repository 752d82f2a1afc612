//! `authreplica-auth` — credential verification and token issuance.
//!
//! This crate is decoupled from HTTP; storage is reached only through the
//! `CredentialStore` contract from `authreplica-core`.

pub mod claims;
pub mod gateway;
pub mod issuer;
pub mod password;
pub mod validator;

pub use claims::{AccessClaims, RefreshClaims, TokenValidationError, validate_window};
pub use gateway::{AuthError, AuthGateway, LoginPolicy, LoginTokens};
pub use issuer::{TokenError, TokenIssuer, TokenLifetimes};
pub use password::{BcryptPasswords, PasswordError, PasswordHasher, PasswordVerifier};
pub use validator::{Hs256JwtValidator, JwtValidator};
