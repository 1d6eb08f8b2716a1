//! Deterministic fakes for the credential lifecycle seams

// Test doubles: errors are visible in their return types
#![allow(clippy::missing_errors_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{CredentialStore, RefreshClientError, RefreshExchange, TokenSet};
use crate::security::KeychainError;

/// In-memory [`CredentialStore`]
///
/// Clones share the same map, so a test can keep a handle while the token
/// manager owns another.
///
/// # Examples
///
/// ```
/// use pawlink_common::testing::MemoryCredentialStore;
///
/// let store = MemoryCredentialStore::new();
/// store.insert("access.main", "token");
/// assert_eq!(store.get_string("access.main").as_deref(), Some("token"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    /// Countdown to a single failing `save`; zero means disarmed
    fail_on_save: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry directly, bypassing the trait
    pub fn insert(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.as_bytes().to_vec());
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of `save` calls that reached the store
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls, including deletes of absent keys
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make every subsequent `save` fail with `AccessFailed`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only the `nth` subsequent `save` fail (1-based); later saves succeed
    pub fn fail_on_save(&self, nth: usize) {
        self.fail_on_save.store(nth, Ordering::SeqCst);
    }

    fn trips_countdown(&self) -> bool {
        self.fail_on_save
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok_and(|left| left == 1)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), KeychainError> {
        if self.fail_writes.load(Ordering::SeqCst) || self.trips_countdown() {
            return Err(KeychainError::AccessFailed(format!("write to {key} refused")));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, KeychainError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), KeychainError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().remove(key);
        Ok(())
    }
}

type ScriptedOutcome = Result<TokenSet, RefreshClientError>;

/// [`RefreshExchange`] that replays queued outcomes and counts calls
///
/// An exhausted script answers with `RefreshClientError::Transport`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRefreshExchange {
    script: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    calls: Arc<AtomicUsize>,
    last_refresh_token: Arc<Mutex<Option<String>>>,
    delay: Option<Duration>,
}

impl ScriptedRefreshExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every exchange for `delay` before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, tokens: TokenSet) {
        self.script.lock().push_back(Ok(tokens));
    }

    pub fn push_err(&self, error: RefreshClientError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of exchanges performed so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }
}

#[async_trait]
impl RefreshExchange for ScriptedRefreshExchange {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenSet, RefreshClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock() = Some(refresh_token.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(RefreshClientError::Transport("no scripted response".into())))
    }
}
