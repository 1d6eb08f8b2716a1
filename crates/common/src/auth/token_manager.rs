//! Token manager with single-flight refresh
//!
//! Owns the current [`CredentialState`] and is the only writer of it:
//! - loads persisted credentials on startup
//! - refreshes the access token at most once per burst of concurrent callers
//! - persists every change before publishing it in memory
//! - clears everything on invalidation, winning over any in-flight refresh
//! - clears everything when the identity provider rejects the refresh token
//! - optionally refreshes in the background ahead of expiry
//!
//! # Concurrency
//!
//! `state` guards the credential pair together with a `generation` counter.
//! Refreshes additionally serialize on `refresh_gate`. A caller records the
//! generation before queueing on the gate; if it changed by the time the
//! caller gets through, another refresh (or an invalidation) settled in the
//! meantime and its outcome is reused instead of exchanging again.
//!
//! The exchange itself runs on a spawned task that owns the gate, so a
//! cancelled caller leaves the refresh to settle on its own.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::RefreshClientError;
use super::keychain::{self, CredentialKeys};
use super::token;
use super::traits::{CredentialStore, RefreshExchange};
use super::types::{CredentialState, TokenSet};
use crate::error::{ErrorClassification, ErrorSeverity};
use crate::security::KeychainError;

const AUTO_REFRESH_RECHECK: Duration = Duration::from_secs(60);

/// Error type for token manager operations
#[derive(Debug, Error)]
pub enum TokenManagerError {
    /// Secure store read/write failed
    #[error("credential store error: {0}")]
    Store(#[from] KeychainError),

    /// Identity provider exchange failed
    #[error("refresh exchange failed: {0}")]
    Exchange(#[from] RefreshClientError),

    /// No credentials held
    #[error("not authenticated")]
    NotAuthenticated,

    /// Refresh requested without a refresh token
    #[error("no refresh token available")]
    NoRefreshToken,

    /// Identity provider answered with a token that is not a JWT
    #[error("identity provider returned a malformed access token")]
    MalformedToken,

    /// Credentials were invalidated while the refresh was in flight
    #[error("refresh superseded by invalidation")]
    Superseded,

    /// The detached refresh task panicked or was cancelled
    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}

impl ErrorClassification for TokenManagerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Exchange(RefreshClientError::Transport(_)) | Self::Store(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotAuthenticated | Self::NoRefreshToken | Self::Superseded => {
                ErrorSeverity::Info
            }
            Self::Exchange(_) => ErrorSeverity::Warning,
            Self::Store(_) | Self::TaskFailed(_) => ErrorSeverity::Error,
            Self::MalformedToken => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::MalformedToken)
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    Always,
    /// Skip the exchange if the token became fresh while waiting on the gate
    IfNearExpiry,
}

#[derive(Debug, Default)]
struct ManagerState {
    credentials: CredentialState,
    /// Bumped whenever a refresh settles or the credentials are replaced
    generation: u64,
    refreshing: bool,
    last_refresh_ok: bool,
}

/// Credential lifecycle manager
///
/// Shared by every request, stream and upload through an `Arc`.
pub struct TokenManager<C: RefreshExchange + 'static, S: CredentialStore + ?Sized + 'static> {
    exchange: Arc<C>,
    store: Arc<S>,
    keys: CredentialKeys,
    state: Arc<Mutex<ManagerState>>,
    refresh_gate: Arc<Mutex<()>>,
    refresh_buffer_seconds: i64,
}

impl<C, S> TokenManager<C, S>
where
    C: RefreshExchange + 'static,
    S: CredentialStore + ?Sized + 'static,
{
    /// Create a token manager
    ///
    /// # Arguments
    /// * `exchange` - Identity provider client used for refreshes
    /// * `store` - Secure store for persistence
    /// * `account` - Account the credential entries are keyed by
    /// * `refresh_buffer_seconds` - Tokens expiring within this window count
    ///   as near expiry (default: 300 = 5 min)
    #[must_use]
    pub fn new(exchange: C, store: Arc<S>, account: &str, refresh_buffer_seconds: i64) -> Self {
        Self {
            exchange: Arc::new(exchange),
            store,
            keys: CredentialKeys::for_account(account),
            state: Arc::new(Mutex::new(ManagerState::default())),
            refresh_gate: Arc::new(Mutex::new(())),
            refresh_buffer_seconds,
        }
    }

    /// Load persisted credentials into memory
    ///
    /// Returns whether any credential material was found.
    ///
    /// # Errors
    /// Returns `TokenManagerError::Store` if the store cannot be read
    pub async fn initialize(&self) -> Result<bool, TokenManagerError> {
        let loaded = keychain::load(self.store.as_ref(), &self.keys).await?;
        let found = !loaded.is_empty();

        let mut state = self.state.lock().await;
        state.credentials = loaded;
        state.generation += 1;

        if found {
            info!(key = %self.keys.access, "token manager initialized with stored credentials");
        } else {
            debug!("no stored credentials found");
        }
        Ok(found)
    }

    /// Install a token set obtained outside the refresh path (login)
    ///
    /// # Errors
    /// - `MalformedToken` when the access token is not a JWT
    /// - `Store` when persisting fails; memory is left untouched in that case
    pub async fn store(&self, tokens: TokenSet) -> Result<(), TokenManagerError> {
        if !token::is_well_formed(&tokens.access_token) {
            return Err(TokenManagerError::MalformedToken);
        }

        let next = CredentialState {
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        };

        let mut state = self.state.lock().await;
        keychain::persist(self.store.as_ref(), &self.keys, &next).await?;
        state.credentials = next;
        state.generation += 1;
        state.last_refresh_ok = true;

        info!("credentials stored");
        Ok(())
    }

    /// Snapshot of the current credentials
    pub async fn credentials(&self) -> CredentialState {
        self.state.lock().await.credentials.clone()
    }

    /// Current access token without any refresh
    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.credentials.access_token.clone()
    }

    /// Access token suitable for dispatch
    ///
    /// Refreshes first when the token is absent or near expiry. Returns
    /// `None` if no token survives that attempt; the caller decides whether
    /// to dispatch without one.
    pub async fn access_token_for_dispatch(&self) -> Option<String> {
        if self.is_near_expiry().await {
            debug!("access token absent or near expiry; refreshing before dispatch");
            if let Err(e) = self.refresh_with(RefreshMode::IfNearExpiry).await {
                warn!(error = %e, "pre-dispatch refresh failed");
            }
        }
        self.access_token().await
    }

    /// Like [`Self::access_token_for_dispatch`] but treats a missing token as
    /// an error
    ///
    /// # Errors
    /// Returns `TokenManagerError::NotAuthenticated` if no token survives the
    /// refresh attempt
    pub async fn require_access_token(&self) -> Result<String, TokenManagerError> {
        self.access_token_for_dispatch().await.ok_or(TokenManagerError::NotAuthenticated)
    }

    /// Whether the access token is absent, of unknown lifetime, or inside the
    /// refresh buffer
    pub async fn is_near_expiry(&self) -> bool {
        self.state.lock().await.credentials.is_near_expiry(self.refresh_buffer_seconds)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.credentials.access_token.is_some()
    }

    /// Whether a refresh exchange is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.refreshing
    }

    /// Refresh the access token, reporting only success
    ///
    /// Failures are logged; the previous credentials stay in place unless an
    /// invalidation or a rejected refresh token cleared them.
    pub async fn refresh(&self) -> bool {
        match self.try_refresh().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Refresh the access token
    ///
    /// Concurrent callers share one exchange: whoever holds the gate performs
    /// it, everyone queued behind adopts its outcome.
    ///
    /// # Errors
    /// - `NoRefreshToken` when there is nothing to exchange
    /// - `Exchange` when the identity provider fails or rejects the token; a
    ///   refused refresh token also clears the credentials from memory and
    ///   the store
    /// - `MalformedToken` when the new access token is not a JWT
    /// - `Store` when the new credentials cannot be persisted
    /// - `Superseded` when an invalidation landed during the exchange
    /// - `TaskFailed` when the refresh task panicked
    pub async fn try_refresh(&self) -> Result<(), TokenManagerError> {
        self.refresh_with(RefreshMode::Always).await
    }

    async fn refresh_with(&self, mode: RefreshMode) -> Result<(), TokenManagerError> {
        let observed = self.state.lock().await.generation;
        let gate = Arc::clone(&self.refresh_gate).lock_owned().await;

        let refresh_token = {
            let mut state = self.state.lock().await;
            if state.generation != observed {
                debug!("refresh settled by a concurrent caller");
                return if state.last_refresh_ok { Ok(()) } else { Err(TokenManagerError::Superseded) };
            }
            if mode == RefreshMode::IfNearExpiry
                && !state.credentials.is_near_expiry(self.refresh_buffer_seconds)
            {
                return Ok(());
            }
            let refresh_token =
                state.credentials.refresh_token.clone().ok_or(TokenManagerError::NoRefreshToken)?;
            state.refreshing = true;
            refresh_token
        };

        // Detached: dropping this caller must not abandon a refresh mid-exchange
        let flight = Flight {
            exchange: Arc::clone(&self.exchange),
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            state: Arc::clone(&self.state),
            observed,
            _gate: gate,
        };
        match tokio::spawn(flight.run(refresh_token)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "refresh task did not complete");
                let mut state = self.state.lock().await;
                state.refreshing = false;
                state.generation += 1;
                state.last_refresh_ok = false;
                Err(TokenManagerError::TaskFailed(e.to_string()))
            }
        }
    }

    /// Clear credentials from memory and the store
    ///
    /// Idempotent. Any refresh in flight fails with `Superseded` and leaves
    /// the state empty. Store failures are logged, memory is cleared anyway.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        discard(&mut state, self.store.as_ref(), &self.keys).await;
        info!("credentials invalidated");
    }

    /// Local sanity check of `token`
    ///
    /// The token must be shaped like a JWT and unexpired: against the tracked
    /// expiry when it is the current access token, against its own `exp`
    /// claim otherwise.
    pub async fn validate(&self, token: &str) -> bool {
        if !token::is_well_formed(token) {
            return false;
        }

        let state = self.state.lock().await;
        let expires_at = if state.credentials.access_token.as_deref() == Some(token) {
            state.credentials.expires_at
        } else {
            token::expiry_claim(token)
        };

        expires_at.is_some_and(|expires_at| expires_at > chrono::Utc::now())
    }

    /// Seconds until the access token expires, if known
    pub async fn seconds_until_expiry(&self) -> Option<i64> {
        self.state.lock().await.credentials.seconds_until_expiry()
    }

    #[must_use]
    pub fn refresh_buffer(&self) -> i64 {
        self.refresh_buffer_seconds
    }

    /// Start the background refresh task
    ///
    /// The task sleeps until the token enters the refresh buffer, refreshes
    /// it, and repeats. Without a known expiry, or after a failed refresh, it
    /// checks again a minute later. It exits when `cancel` fires.
    pub fn spawn_auto_refresh(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("starting token auto-refresh task");

            loop {
                let wake = self.next_wake().await;
                if !wake.is_zero() {
                    debug!(seconds = wake.as_secs(), "auto-refresh sleeping");
                }

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wake) => {}
                }

                let has_refresh_token = self.state.lock().await.credentials.refresh_token.is_some();
                if !has_refresh_token || !self.is_near_expiry().await {
                    continue;
                }

                info!("auto-refresh: token expiring soon");
                if let Err(e) = self.refresh_with(RefreshMode::IfNearExpiry).await {
                    warn!(error = %e, "auto-refresh failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(AUTO_REFRESH_RECHECK) => {}
                    }
                }
            }

            info!("token auto-refresh task stopped");
        })
    }

    async fn next_wake(&self) -> Duration {
        let state = self.state.lock().await;
        if state.credentials.refresh_token.is_none() {
            return AUTO_REFRESH_RECHECK;
        }
        match state.credentials.seconds_until_expiry() {
            Some(remaining) => {
                let until_refresh = remaining - self.refresh_buffer_seconds;
                u64::try_from(until_refresh).map_or(Duration::ZERO, Duration::from_secs)
            }
            None if state.credentials.access_token.is_none() => Duration::ZERO,
            None => AUTO_REFRESH_RECHECK,
        }
    }
}

/// One refresh exchange, from the identity provider call to the commit
///
/// Holds the refresh gate until it settles.
struct Flight<C: ?Sized, S: ?Sized> {
    exchange: Arc<C>,
    store: Arc<S>,
    keys: CredentialKeys,
    state: Arc<Mutex<ManagerState>>,
    observed: u64,
    _gate: OwnedMutexGuard<()>,
}

impl<C, S> Flight<C, S>
where
    C: RefreshExchange + ?Sized,
    S: CredentialStore + ?Sized,
{
    async fn run(self, refresh_token: String) -> Result<(), TokenManagerError> {
        debug!("exchanging refresh token");
        let exchanged = self.exchange.refresh_access_token(&refresh_token).await;

        let mut state = self.state.lock().await;
        state.refreshing = false;
        let outcome = match exchanged {
            Ok(tokens) => self.commit(&mut state, tokens).await,
            Err(e) if e.is_irrecoverable() => {
                if state.generation == self.observed {
                    warn!(error = %e, "refresh token rejected; discarding credentials");
                    discard(&mut state, self.store.as_ref(), &self.keys).await;
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        };
        state.generation += 1;
        state.last_refresh_ok = outcome.is_ok();

        if outcome.is_ok() {
            info!("access token refreshed");
        }
        outcome
    }

    async fn commit(
        &self,
        state: &mut ManagerState,
        tokens: TokenSet,
    ) -> Result<(), TokenManagerError> {
        if state.generation != self.observed {
            return Err(TokenManagerError::Superseded);
        }
        if !token::is_well_formed(&tokens.access_token) {
            return Err(TokenManagerError::MalformedToken);
        }

        let mut next = state.credentials.clone();
        next.apply(tokens);
        keychain::persist(self.store.as_ref(), &self.keys, &next).await?;
        state.credentials = next;
        Ok(())
    }
}

/// Empty memory and the store; store failures are logged
async fn discard<S>(state: &mut ManagerState, store: &S, keys: &CredentialKeys)
where
    S: CredentialStore + ?Sized,
{
    state.credentials = CredentialState::default();
    state.generation += 1;
    state.last_refresh_ok = false;

    if let Err(e) = keychain::erase(store, keys).await {
        error!(error = %e, "failed to erase stored credentials");
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::token_manager.
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::auth::OAuthError;
    use crate::testing::{fake_jwt, MemoryCredentialStore, ScriptedRefreshExchange};

    fn manager(
        exchange: ScriptedRefreshExchange,
    ) -> (TokenManager<ScriptedRefreshExchange, MemoryCredentialStore>, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        (TokenManager::new(exchange, Arc::clone(&store), "main", 300), store)
    }

    fn expiring_in(seconds: i64) -> TokenSet {
        TokenSet::with_expiry(
            fake_jwt(Utc::now().timestamp() + seconds),
            Some("refresh-1".into()),
            Some(Utc::now() + ChronoDuration::seconds(seconds)),
        )
    }

    /// Validates the fresh manager scenario.
    ///
    /// Assertions:
    /// - Ensures a new manager holds no credentials and reports near expiry.
    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let (manager, _) = manager(ScriptedRefreshExchange::new());
        assert!(!manager.is_authenticated().await);
        assert!(manager.is_near_expiry().await);
        assert!(!manager.is_refreshing().await);
    }

    /// Validates store-then-initialize across two managers sharing a store.
    ///
    /// Assertions:
    /// - Confirms the second manager loads the persisted pair and expiry.
    #[tokio::test]
    async fn test_store_survives_restart() {
        let (first, store) = manager(ScriptedRefreshExchange::new());
        let tokens = expiring_in(3600);
        first.store(tokens.clone()).await.unwrap();

        let second = TokenManager::new(ScriptedRefreshExchange::new(), store, "main", 300);
        assert!(second.initialize().await.unwrap());
        let loaded = second.credentials().await;
        assert_eq!(loaded.access_token.as_deref(), Some(tokens.access_token.as_str()));
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            loaded.expires_at.map(|dt| dt.timestamp()),
            tokens.expires_at.map(|dt| dt.timestamp())
        );
    }

    /// Validates refresh without a refresh token.
    ///
    /// Assertions:
    /// - Ensures the refresh fails fast and the exchange is never called.
    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let exchange = ScriptedRefreshExchange::new();
        let (manager, _) = manager(exchange.clone());
        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::NoRefreshToken)));
        assert_eq!(exchange.calls(), 0);
    }

    /// Validates a successful refresh.
    ///
    /// Assertions:
    /// - Confirms the new token is persisted and the refresh token rotates.
    #[tokio::test]
    async fn test_refresh_persists_before_publishing() {
        let exchange = ScriptedRefreshExchange::new();
        let fresh = fake_jwt(Utc::now().timestamp() + 3600);
        exchange.push_ok(TokenSet::new(fresh.clone(), Some("refresh-2".into()), Some(3600)));
        let (manager, store) = manager(exchange.clone());
        manager.store(expiring_in(10)).await.unwrap();

        assert!(manager.refresh().await);
        assert_eq!(exchange.calls(), 1);
        assert_eq!(exchange.last_refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(manager.access_token().await.as_deref(), Some(fresh.as_str()));
        assert_eq!(store.get_string("access.main").as_deref(), Some(fresh.as_str()));
        assert_eq!(store.get_string("refresh.main").as_deref(), Some("refresh-2"));
        assert!(!manager.is_near_expiry().await);
    }

    /// Validates a rejected refresh.
    ///
    /// Assertions:
    /// - Ensures the previous credentials stay in place.
    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_state() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_err(RefreshClientError::Transport("offline".into()));
        let (manager, _) = manager(exchange);
        let tokens = expiring_in(10);
        manager.store(tokens.clone()).await.unwrap();

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::Exchange(_))));
        assert_eq!(manager.access_token().await, Some(tokens.access_token));
    }

    /// Validates a refresh that returns a non-JWT access token.
    #[tokio::test]
    async fn test_refresh_rejects_malformed_token() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_ok(TokenSet::new("not-a-jwt".into(), None, Some(3600)));
        let (manager, store) = manager(exchange);
        let tokens = expiring_in(10);
        manager.store(tokens.clone()).await.unwrap();

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::MalformedToken)));
        assert_eq!(store.get_string("access.main"), Some(tokens.access_token));
    }

    #[tokio::test]
    async fn test_store_rejects_malformed_token() {
        let (manager, store) = manager(ScriptedRefreshExchange::new());
        let result = manager.store(TokenSet::new("opaque".into(), None, Some(60))).await;

        assert!(matches!(result, Err(TokenManagerError::MalformedToken)));
        assert!(store.is_empty());
        assert!(!manager.is_authenticated().await);
    }

    /// Validates a store failure during refresh.
    ///
    /// Assertions:
    /// - Ensures memory is not updated when persisting fails.
    #[tokio::test]
    async fn test_store_failure_leaves_memory_untouched() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_ok(TokenSet::new(fake_jwt(Utc::now().timestamp() + 3600), None, None));
        let (manager, store) = manager(exchange);
        let tokens = expiring_in(10);
        manager.store(tokens.clone()).await.unwrap();
        store.fail_writes(true);

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::Store(_))));
        assert_eq!(manager.access_token().await, Some(tokens.access_token));
    }

    /// Validates single-flight refresh.
    ///
    /// Assertions:
    /// - Confirms eight concurrent refreshes trigger exactly one exchange and
    ///   all observe success.
    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let exchange = ScriptedRefreshExchange::new().with_delay(Duration::from_millis(50));
        exchange.push_ok(TokenSet::new(fake_jwt(Utc::now().timestamp() + 3600), None, None));
        let (manager, _) = manager(exchange.clone());
        manager.store(expiring_in(10)).await.unwrap();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.refresh().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(exchange.calls(), 1);
    }

    /// Validates invalidation racing a refresh.
    ///
    /// Assertions:
    /// - Ensures the refresh is superseded and the final state is empty.
    #[tokio::test]
    async fn test_invalidate_wins_over_inflight_refresh() {
        let exchange = ScriptedRefreshExchange::new().with_delay(Duration::from_millis(100));
        exchange.push_ok(TokenSet::new(fake_jwt(Utc::now().timestamp() + 3600), None, None));
        let (manager, store) = manager(exchange);
        manager.store(expiring_in(10)).await.unwrap();
        let manager = Arc::new(manager);

        let refreshing = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.try_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_refreshing().await);
        manager.invalidate().await;

        assert!(matches!(refreshing.await.unwrap(), Err(TokenManagerError::Superseded)));
        assert!(manager.credentials().await.is_empty());
        assert!(store.is_empty());
    }

    /// Validates invalidation racing a refresh that then fails.
    ///
    /// Assertions:
    /// - Ensures the exchange failure surfaces to the refreshing caller.
    /// - Ensures a caller queued behind it is told the refresh was superseded.
    /// - Confirms nothing is resurrected in memory or the store.
    #[tokio::test]
    async fn test_invalidate_wins_over_failing_inflight_refresh() {
        let exchange = ScriptedRefreshExchange::new().with_delay(Duration::from_millis(100));
        exchange.push_err(RefreshClientError::Transport("offline".into()));
        let (manager, store) = manager(exchange.clone());
        manager.store(expiring_in(10)).await.unwrap();
        let manager = Arc::new(manager);

        let refreshing = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.try_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let queued = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.try_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.invalidate().await;

        assert!(matches!(
            refreshing.await.unwrap(),
            Err(TokenManagerError::Exchange(RefreshClientError::Transport(_)))
        ));
        assert!(matches!(queued.await.unwrap(), Err(TokenManagerError::Superseded)));
        assert_eq!(exchange.calls(), 1);
        assert!(manager.credentials().await.is_empty());
        assert!(!manager.is_refreshing().await);
        assert!(store.is_empty());
    }

    /// Validates a refresh token the identity provider refuses.
    ///
    /// Assertions:
    /// - Ensures memory and the store are emptied.
    /// - Confirms a later refresh fails locally instead of replaying the
    ///   refused token.
    #[tokio::test]
    async fn test_refused_refresh_token_discards_credentials() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_err(RefreshClientError::Rejected {
            status: 400,
            error: OAuthError {
                error: "invalid_grant".into(),
                error_description: Some("refresh token revoked".into()),
            },
        });
        let (manager, store) = manager(exchange.clone());
        manager.store(expiring_in(10)).await.unwrap();

        assert!(!manager.refresh().await);
        assert!(manager.credentials().await.is_empty());
        assert!(!manager.is_authenticated().await);
        assert!(store.is_empty());

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::NoRefreshToken)));
        assert_eq!(exchange.calls(), 1);
    }

    /// Validates a token endpoint outage answered with a 5xx.
    ///
    /// Assertions:
    /// - Ensures the credentials survive for a later retry.
    #[tokio::test]
    async fn test_token_endpoint_outage_keeps_credentials() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_err(RefreshClientError::Rejected {
            status: 503,
            error: OAuthError { error: "http_error".into(), error_description: None },
        });
        let (manager, store) = manager(exchange);
        let tokens = expiring_in(10);
        manager.store(tokens.clone()).await.unwrap();

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::Exchange(_))));
        assert_eq!(manager.access_token().await, Some(tokens.access_token.clone()));
        assert_eq!(store.get_string("access.main"), Some(tokens.access_token));
        assert_eq!(store.get_string("refresh.main").as_deref(), Some("refresh-1"));
    }

    /// Validates a refresh whose persist fails after the first entry.
    ///
    /// Assertions:
    /// - Confirms a restarted manager loads the previous access token,
    ///   refresh token and expiry together.
    #[tokio::test]
    async fn test_partial_persist_failure_restores_previous_credentials() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_ok(TokenSet::new(
            fake_jwt(Utc::now().timestamp() + 3600),
            Some("refresh-2".into()),
            Some(3600),
        ));
        let (manager, store) = manager(exchange);
        let tokens = expiring_in(10);
        manager.store(tokens.clone()).await.unwrap();
        store.fail_on_save(2);

        assert!(matches!(manager.try_refresh().await, Err(TokenManagerError::Store(_))));

        let restarted = TokenManager::new(ScriptedRefreshExchange::new(), store, "main", 300);
        assert!(restarted.initialize().await.unwrap());
        let loaded = restarted.credentials().await;
        assert_eq!(loaded.access_token, Some(tokens.access_token));
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            loaded.expires_at.map(|dt| dt.timestamp()),
            tokens.expires_at.map(|dt| dt.timestamp())
        );
    }

    /// Validates a refresh whose caller is cancelled mid-exchange.
    ///
    /// Assertions:
    /// - Ensures the exchange still settles and clears the in-flight flag.
    /// - Confirms the new token is committed without a second exchange.
    #[tokio::test]
    async fn test_cancelled_caller_does_not_strand_refresh() {
        let exchange = ScriptedRefreshExchange::new().with_delay(Duration::from_millis(200));
        let fresh = fake_jwt(Utc::now().timestamp() + 3600);
        exchange.push_ok(TokenSet::new(fresh.clone(), Some("refresh-2".into()), Some(3600)));
        let (manager, store) = manager(exchange.clone());
        manager.store(expiring_in(10)).await.unwrap();
        let manager = Arc::new(manager);

        let caller = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.try_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.is_refreshing().await);
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        for _ in 0..100 {
            if !manager.is_refreshing().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!manager.is_refreshing().await);
        assert_eq!(manager.access_token().await, Some(fresh.clone()));
        assert_eq!(store.get_string("access.main"), Some(fresh.clone()));

        assert_eq!(manager.access_token_for_dispatch().await, Some(fresh));
        assert_eq!(exchange.calls(), 1);
    }

    /// Validates idempotent invalidation.
    #[tokio::test]
    async fn test_invalidate_twice() {
        let (manager, store) = manager(ScriptedRefreshExchange::new());
        manager.store(expiring_in(3600)).await.unwrap();
        manager.invalidate().await;
        manager.invalidate().await;
        assert!(!manager.is_authenticated().await);
        assert!(store.is_empty());
    }

    /// Validates dispatch-time refresh for a token inside the buffer.
    ///
    /// Assertions:
    /// - Confirms a token expiring in 60s with a 300s buffer is refreshed
    ///   exactly once before being handed out.
    #[tokio::test]
    async fn test_dispatch_token_refreshes_near_expiry() {
        let exchange = ScriptedRefreshExchange::new();
        let fresh = fake_jwt(Utc::now().timestamp() + 3600);
        exchange.push_ok(TokenSet::new(fresh.clone(), None, Some(3600)));
        let (manager, _) = manager(exchange.clone());
        manager.store(expiring_in(60)).await.unwrap();

        assert_eq!(manager.access_token_for_dispatch().await, Some(fresh.clone()));
        assert_eq!(manager.access_token_for_dispatch().await, Some(fresh));
        assert_eq!(exchange.calls(), 1);
    }

    /// Validates local token validation.
    #[tokio::test]
    async fn test_validate() {
        let (manager, _) = manager(ScriptedRefreshExchange::new());
        let tokens = expiring_in(3600);
        manager.store(tokens.clone()).await.unwrap();

        assert!(manager.validate(&tokens.access_token).await);
        assert!(!manager.validate("garbage").await);
        assert!(!manager.validate(&fake_jwt(Utc::now().timestamp() - 10)).await);
        assert!(manager.validate(&fake_jwt(Utc::now().timestamp() + 60)).await);
    }

    /// Validates that the background task refreshes a token inside the buffer
    /// and stops on cancellation.
    #[tokio::test]
    async fn test_auto_refresh_task() {
        let exchange = ScriptedRefreshExchange::new();
        exchange.push_ok(TokenSet::new(fake_jwt(Utc::now().timestamp() + 3600), None, Some(3600)));
        let (manager, _) = manager(exchange.clone());
        manager.store(expiring_in(30)).await.unwrap();
        let manager = Arc::new(manager);

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&manager).spawn_auto_refresh(cancel.clone());

        for _ in 0..50 {
            if exchange.calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(exchange.calls(), 1);
        assert!(!manager.is_near_expiry().await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
