//! Request authorization
//!
//! The pipeline, upload path and streaming channel see the token lifecycle
//! only through [`RequestAuthenticator`], so tests and hosts can substitute
//! their own credential source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pawlink_common::auth::{CredentialStore, HttpRefreshClient, RefreshExchange, TokenManager};
use pawlink_common::security::KeychainProvider;
use pawlink_domain::{AuthConfig, PawlinkError};
use tracing::debug;

use super::endpoint::Endpoint;

/// Authorization seam between calls and the token lifecycle
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    /// Copy of `endpoint` ready for dispatch
    ///
    /// Public endpoints come back unchanged without touching credential
    /// state. Otherwise a bearer token is attached when one is available
    /// after any needed refresh; when none is, the copy carries no
    /// `Authorization` header.
    async fn adapt(&self, endpoint: &Endpoint) -> Endpoint;

    /// Refresh credentials after a rejected token; reports success only
    async fn refresh(&self) -> bool;

    /// Drop all credentials
    async fn invalidate(&self);
}

#[async_trait]
impl<C, S> RequestAuthenticator for TokenManager<C, S>
where
    C: RefreshExchange + 'static,
    S: CredentialStore + ?Sized + 'static,
{
    async fn adapt(&self, endpoint: &Endpoint) -> Endpoint {
        if !endpoint.requires_auth() {
            return endpoint.clone();
        }

        match self.access_token_for_dispatch().await {
            Some(token) => endpoint.with_bearer(&token),
            None => {
                debug!(endpoint = endpoint.target(), "no access token available; dispatching without one");
                endpoint.clone()
            }
        }
    }

    async fn refresh(&self) -> bool {
        Self::refresh(self).await
    }

    async fn invalidate(&self) {
        Self::invalidate(self).await;
    }
}

/// Token manager backed by the platform keychain and the HTTP refresh client
///
/// # Errors
/// Returns `PawlinkError::Config` if the refresh client cannot be built
pub fn keychain_token_manager(
    config: &AuthConfig,
    timeout: Duration,
) -> Result<TokenManager<HttpRefreshClient, KeychainProvider>, PawlinkError> {
    let exchange = HttpRefreshClient::new(config.token_url.clone(), config.client_id.clone(), timeout)
        .map_err(|e| PawlinkError::Config(format!("failed to build refresh client: {e}")))?;
    let store = Arc::new(KeychainProvider::new(config.keychain_service.clone()));

    Ok(TokenManager::new(exchange, store, &config.account, config.refresh_buffer_secs))
}
