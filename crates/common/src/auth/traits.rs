//! Seams of the credential lifecycle
//!
//! The token manager talks to two collaborators it does not own: the secure
//! store that persists credential bytes across launches, and the identity
//! provider that mints new access tokens. Both are traits so tests can swap
//! in deterministic fakes.

use async_trait::async_trait;

use super::client::RefreshClientError;
use super::types::TokenSet;
use crate::security::KeychainError;

/// Byte-oriented secure store (platform keychain or an in-memory fake)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the backend rejects the write
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), KeychainError>;

    /// Read the value stored under `key`; `Ok(None)` when absent
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the backend cannot be read
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, KeychainError>;

    /// Remove `key`; removing an absent key succeeds
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the backend rejects the delete
    async fn delete(&self, key: &str) -> Result<(), KeychainError>;
}

/// Identity provider exchange: refresh token in, new token set out
#[async_trait]
pub trait RefreshExchange: Send + Sync {
    /// Mint a new access token from `refresh_token`
    ///
    /// # Errors
    /// Returns an error if the provider is unreachable, rejects the refresh
    /// token, or answers with an unreadable body
    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<TokenSet, RefreshClientError>;
}
