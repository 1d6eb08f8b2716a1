//! Platform keychain provider
//!
//! Thin wrapper over the `keyring` crate: macOS Keychain Access, Windows
//! Credential Manager, Linux Secret Service. Values are stored as raw bytes
//! under `(service, key)`.
//!
//! ## Usage
//!
//! ```no_run
//! use pawlink_common::security::KeychainProvider;
//!
//! let keychain = KeychainProvider::new("Pawlink.api");
//! keychain.set_secret("access.main", b"eyJ...")?;
//! let secret = keychain.get_secret("access.main")?;
//! assert_eq!(secret.as_deref(), Some(&b"eyJ..."[..]));
//! # Ok::<(), pawlink_common::security::KeychainError>(())
//! ```

use async_trait::async_trait;
use keyring::Entry;
use thiserror::Error;
use tracing::debug;

use crate::auth::CredentialStore;

/// Keychain-backed credential store
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a provider for one service namespace (e.g. "Pawlink.api")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Store a secret
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &[u8]) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "storing secret in keychain");

        self.entry(key)?.set_secret(value).map_err(|e| {
            KeychainError::AccessFailed(format!("failed to store secret for {key}: {e}"))
        })
    }

    /// Read a secret; `Ok(None)` when the entry does not exist
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>, KeychainError> {
        debug!(service = %self.service_name, key = %key, "retrieving secret from keychain");

        match self.entry(key)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "failed to retrieve secret for {key}: {e}"
            ))),
        }
    }

    /// Delete a secret (idempotent)
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "deleting secret from keychain");

        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                Err(KeychainError::AccessFailed(format!("failed to delete secret for {key}: {e}")))
            }
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, key).map_err(KeychainError::from)
    }
}

#[async_trait]
impl CredentialStore for KeychainProvider {
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), KeychainError> {
        self.set_secret(key, value)
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, KeychainError> {
        self.get_secret(key)
    }

    async fn delete(&self, key: &str) -> Result<(), KeychainError> {
        self.delete_secret(key)
    }
}

/// Keychain errors
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, not available, etc.)
    #[error("keychain access failed: {0}")]
    AccessFailed(String),

    /// Stored bytes could not be interpreted
    #[error("invalid keychain data: {0}")]
    InvalidData(String),

    /// Underlying keyring library error
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}
