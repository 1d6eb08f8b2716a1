//! Credential persistence layered on top of a [`CredentialStore`]
//!
//! Each account owns three entries:
//!
//! - `access.<account>`: access token (UTF-8)
//! - `refresh.<account>`: refresh token (UTF-8)
//! - `expiry.<account>`: access token expiry as decimal unix seconds
//!
//! An absent field is represented by an absent entry, never by an empty one.

use chrono::DateTime;
use tracing::{debug, warn};

use crate::auth::traits::CredentialStore;
use crate::auth::types::CredentialState;
use crate::security::KeychainError;

const ACCESS_PREFIX: &str = "access.";
const REFRESH_PREFIX: &str = "refresh.";
const EXPIRY_PREFIX: &str = "expiry.";

/// Store keys for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialKeys {
    pub access: String,
    pub refresh: String,
    pub expiry: String,
}

impl CredentialKeys {
    #[must_use]
    pub fn for_account(account: &str) -> Self {
        Self {
            access: format!("{ACCESS_PREFIX}{account}"),
            refresh: format!("{REFRESH_PREFIX}{account}"),
            expiry: format!("{EXPIRY_PREFIX}{account}"),
        }
    }
}

/// Write every field of `state`, deleting entries for absent fields
///
/// The access token is written last. If any write fails, the entries held
/// before the call are restored best-effort and the original error returned.
pub(crate) async fn persist<S>(
    store: &S,
    keys: &CredentialKeys,
    state: &CredentialState,
) -> Result<(), KeychainError>
where
    S: CredentialStore + ?Sized,
{
    debug!(key = %keys.access, "persisting credentials");

    let previous = load(store, keys).await;
    let Err(e) = write_all(store, keys, state).await else {
        return Ok(());
    };

    match previous {
        Ok(previous) => {
            if let Err(rollback) = write_all(store, keys, &previous).await {
                warn!(key = %keys.access, error = %rollback, "credential rollback failed");
            }
        }
        Err(unreadable) => {
            warn!(key = %keys.access, error = %unreadable, "no readable snapshot to roll back to");
        }
    }
    Err(e)
}

async fn write_all<S>(
    store: &S,
    keys: &CredentialKeys,
    state: &CredentialState,
) -> Result<(), KeychainError>
where
    S: CredentialStore + ?Sized,
{
    let expiry = state.expires_at.map(|dt| dt.timestamp().to_string());
    write_or_delete(store, &keys.expiry, expiry.as_deref()).await?;
    write_or_delete(store, &keys.refresh, state.refresh_token.as_deref()).await?;
    write_or_delete(store, &keys.access, state.access_token.as_deref()).await
}

/// Read whatever credential material the store holds
pub(crate) async fn load<S>(store: &S, keys: &CredentialKeys) -> Result<CredentialState, KeychainError>
where
    S: CredentialStore + ?Sized,
{
    let access_token = read_string(store, &keys.access).await?;
    let refresh_token = read_string(store, &keys.refresh).await?;
    let expires_at = match read_string(store, &keys.expiry).await? {
        Some(raw) => {
            let seconds = raw
                .trim()
                .parse::<i64>()
                .map_err(|e| KeychainError::InvalidData(format!("{}: {e}", keys.expiry)))?;
            DateTime::from_timestamp(seconds, 0)
        }
        None => None,
    };

    Ok(CredentialState { access_token, refresh_token, expires_at })
}

/// Remove all three entries (idempotent)
pub(crate) async fn erase<S>(store: &S, keys: &CredentialKeys) -> Result<(), KeychainError>
where
    S: CredentialStore + ?Sized,
{
    debug!(key = %keys.access, "erasing credentials");

    store.delete(&keys.access).await?;
    store.delete(&keys.refresh).await?;
    store.delete(&keys.expiry).await
}

async fn write_or_delete<S>(store: &S, key: &str, value: Option<&str>) -> Result<(), KeychainError>
where
    S: CredentialStore + ?Sized,
{
    match value {
        Some(value) => store.save(key, value.as_bytes()).await,
        None => store.delete(key).await,
    }
}

async fn read_string<S>(store: &S, key: &str) -> Result<Option<String>, KeychainError>
where
    S: CredentialStore + ?Sized,
{
    match store.retrieve(key).await? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| KeychainError::InvalidData(format!("{key}: {e}"))),
        None => Ok(None),
    }
}
