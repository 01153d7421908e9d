//! Authentication module for managing the user's session and token.
//!
//! This module provides:
//! - `Session`: the shared, explicit holder of the bearer token
//! - `CredentialBackend`: where the token is persisted (file, keychain, memory)
//! - `AuthManager`: login, registration, Google sign-in, password reset, logout
//!
//! Holding a token is the only notion of being logged in; tokens are never
//! expired or refreshed client-side.

pub mod credentials;
pub mod manager;
pub mod session;

pub use credentials::{
    CredentialBackend, FileCredentials, KeyringCredentials, MemoryCredentials, StoredToken,
    TOKEN_KEY,
};
pub use manager::{AuthManager, AuthState, IssuedToken, ResetState};
pub use session::Session;

#[cfg(test)]
pub(crate) use credentials::FailingCredentials;
