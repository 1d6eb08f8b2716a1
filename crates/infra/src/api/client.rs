//! Request execution pipeline
//!
//! Every logical call runs the same loop, one pass per attempt:
//!
//! 1. **Preflight**: fail with `NoConnectivity` while offline
//! 2. **Adapt**: attach credentials through the [`RequestAuthenticator`]
//! 3. **Dispatch**: send once under the request timeout
//! 4. **Classify**: decode 2xx; refresh and retry 401; back off and retry
//!    429; everything else is terminal
//!
//! Only 401 and 429 are retried, at most `max_attempts` dispatches in total,
//! waiting `unit * base^(attempt-1)` between attempts. Transport faults and
//! decode failures end the call at their first occurrence.

use std::sync::Arc;
use std::time::Instant;

use pawlink_common::resilience::{BackoffStrategy, RetryContext};
use pawlink_domain::{ClientConfig, PawlinkError, RetryConfig, StreamConfig, UploadConfig};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::auth::RequestAuthenticator;
use super::connectivity::{AlwaysOnline, Connectivity};
use super::endpoint::Endpoint;
use super::errors::ApiError;
use crate::http::HttpClient;
use crate::logging::log_call_outcome;

/// Outcome of classifying one response
enum Attempt<T> {
    Done(Result<T, ApiError>),
    Retry,
}

/// Authenticated API client
///
/// Cheap to clone; clones share the authenticator and connectivity source.
#[derive(Clone)]
pub struct ApiClient {
    pub(super) http: HttpClient,
    pub(super) auth: Arc<dyn RequestAuthenticator>,
    pub(super) connectivity: Arc<dyn Connectivity>,
    pub(super) base_url: Url,
    pub(super) retry: RetryConfig,
    pub(super) stream: StreamConfig,
    pub(super) upload: UploadConfig,
    pub(super) fail_fast_without_token: bool,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("fail_fast_without_token", &self.fail_fast_without_token)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a builder for fluent configuration
    pub fn builder(config: ClientConfig, auth: Arc<dyn RequestAuthenticator>) -> ApiClientBuilder {
        ApiClientBuilder { config, auth, connectivity: None }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Execute `endpoint` and decode the 2xx body as `T`
    ///
    /// `204`/`205` and empty bodies decode from JSON `null`, so `()` and
    /// `Option<_>` work for endpoints without content.
    ///
    /// # Errors
    /// - `NoConnectivity` when offline at any attempt's preflight
    /// - `InvalidEndpoint` when the target does not form a valid request
    /// - `Network` on transport faults and timeouts
    /// - `Unauthorized` when a 401 survives refresh or the attempt budget
    /// - `RateLimited` when 429 persists through every attempt
    /// - `ServerError`/`InvalidResponse` for other non-2xx statuses
    /// - `DecodingFailed` when the body does not decode as `T`
    #[instrument(
        skip(self, endpoint),
        fields(method = %endpoint.method(), endpoint = endpoint.target(), priority = %endpoint.request_priority())
    )]
    pub async fn execute<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ApiError> {
        let started = Instant::now();
        let mut ctx = self.retry_context();

        let result = self.run(endpoint, &mut ctx).await;

        log_call_outcome(endpoint.target(), ctx.attempt, started.elapsed(), &result);
        result
    }

    /// Invalidate the stored credentials
    pub async fn logout(&self) {
        info!("logging out");
        self.auth.invalidate().await;
    }

    async fn run<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        ctx: &mut RetryContext,
    ) -> Result<T, ApiError> {
        let url = endpoint.resolve(&self.base_url)?;

        loop {
            self.preflight()?;
            let adapted = self.authorize(endpoint).await?;

            let attempt = ctx.begin_attempt();
            let response = self.http.send(self.build_request(&adapted, url.clone())).await?;

            match self.classify(response, ctx).await {
                Attempt::Done(result) => return result,
                Attempt::Retry => {
                    let delay = ctx.next_delay();
                    debug!(attempt, ?delay, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn classify<T: DeserializeOwned>(
        &self,
        response: Response,
        ctx: &RetryContext,
    ) -> Attempt<T> {
        let status = response.status();
        let attempt = ctx.attempt;

        if status.is_success() {
            return Attempt::Done(decode(response).await);
        }

        match status {
            StatusCode::UNAUTHORIZED => {
                let reason = read_reason(response).await;
                if !self.auth.refresh().await {
                    warn!(attempt, "401 and token refresh failed");
                    return Attempt::Done(Err(ApiError::Unauthorized(
                        reason.or_else(|| Some("token refresh failed".into())),
                    )));
                }
                if !ctx.can_retry() {
                    warn!(attempt, "401 persisted through every attempt");
                    return Attempt::Done(Err(ApiError::Unauthorized(reason)));
                }
                info!(attempt, "401; token refreshed, retrying");
                Attempt::Retry
            }
            StatusCode::TOO_MANY_REQUESTS => {
                if !ctx.can_retry() {
                    warn!(attempt, "rate limit persisted through every attempt");
                    return Attempt::Done(Err(ApiError::RateLimited { attempts: attempt }));
                }
                info!(attempt, "429; retrying after backoff");
                Attempt::Retry
            }
            _ => {
                let body = read_body(response).await;
                Attempt::Done(Err(ApiError::from_status(status.as_u16(), body)))
            }
        }
    }

    pub(super) fn preflight(&self) -> Result<(), ApiError> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            debug!("offline; skipping dispatch");
            Err(ApiError::NoConnectivity)
        }
    }

    /// Adapt `endpoint`, enforcing the fail-fast policy when configured
    pub(super) async fn authorize(&self, endpoint: &Endpoint) -> Result<Endpoint, ApiError> {
        let adapted = self.auth.adapt(endpoint).await;

        if self.fail_fast_without_token && endpoint.requires_auth() && !adapted.has_authorization() {
            return Err(ApiError::Unauthorized(Some("no access token".into())));
        }
        Ok(adapted)
    }

    fn build_request(&self, endpoint: &Endpoint, url: Url) -> RequestBuilder {
        let mut request = self.http.request(endpoint.method().clone(), url);
        for (name, value) in endpoint.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = endpoint.body_bytes() {
            request = request.body(body.clone());
        }
        request
    }

    fn retry_context(&self) -> RetryContext {
        RetryContext::new(
            self.retry.max_attempts,
            BackoffStrategy::exponential(self.retry.backoff_unit(), self.retry.backoff_base),
        )
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read response body: {e}")))?;

    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT || bytes.is_empty() {
        return serde_json::from_value(serde_json::Value::Null).map_err(|e| {
            ApiError::DecodingFailed(format!("empty {} response: {e}", status.as_u16()))
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ApiError::DecodingFailed(e.to_string()))
}

/// Body of a non-2xx response
///
/// A body that cannot be read is logged and treated as empty; the status
/// alone still classifies the failure.
pub(super) async fn read_body(response: Response) -> String {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(status, error = %e, "failed to read error response body");
            String::new()
        }
    }
}

/// Non-empty response body, used as the rejection reason
pub(super) async fn read_reason(response: Response) -> Option<String> {
    let body = read_body(response).await;
    (!body.trim().is_empty()).then_some(body)
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    auth: Arc<dyn RequestAuthenticator>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl ApiClientBuilder {
    /// Connectivity source consulted before every dispatch
    ///
    /// Defaults to [`AlwaysOnline`].
    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// # Errors
    /// Returns `PawlinkError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built
    pub fn build(self) -> Result<ApiClient, PawlinkError> {
        let config = self.config;
        config.validate()?;

        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| PawlinkError::Config(format!("invalid base_url: {e}")))?;

        let mut http = HttpClient::builder().timeout(config.request_timeout());
        if let Some(agent) = &config.user_agent {
            http = http.user_agent(agent.clone());
        }

        Ok(ApiClient {
            http: http.build()?,
            auth: self.auth,
            connectivity: self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline)),
            base_url,
            retry: config.retry,
            stream: config.stream,
            upload: config.upload,
            fail_fast_without_token: config.auth.fail_fast_without_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pawlink_domain::AuthConfig;

    use super::*;

    struct Anonymous;

    #[async_trait]
    impl RequestAuthenticator for Anonymous {
        async fn adapt(&self, endpoint: &Endpoint) -> Endpoint {
            endpoint.clone()
        }

        async fn refresh(&self) -> bool {
            false
        }

        async fn invalidate(&self) {}
    }

    fn config(base_url: &str) -> ClientConfig {
        ClientConfig::new(base_url, AuthConfig::new("https://auth.pawlink.test/token", "tests"))
    }

    #[test]
    fn test_build_rejects_invalid_base_url() {
        let err = ApiClient::builder(config("not a url"), Arc::new(Anonymous)).build().unwrap_err();
        assert!(matches!(err, PawlinkError::Config(msg) if msg.contains("base_url")));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = config("https://api.pawlink.test");
        config.retry.max_attempts = 0;
        assert!(ApiClient::builder(config, Arc::new(Anonymous)).build().is_err());
    }

    #[test]
    fn test_retry_context_follows_config() {
        let mut config = config("https://api.pawlink.test");
        config.retry.max_attempts = 4;
        let client = ApiClient::builder(config, Arc::new(Anonymous)).build().unwrap();

        let mut ctx = client.retry_context();
        assert_eq!(ctx.max_attempts, 4);
        ctx.begin_attempt();
        assert_eq!(ctx.next_delay(), std::time::Duration::from_secs(1));
        ctx.begin_attempt();
        assert_eq!(ctx.next_delay(), std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_missing_token() {
        let mut config = config("https://api.pawlink.test");
        config.auth.fail_fast_without_token = true;
        let client = ApiClient::builder(config, Arc::new(Anonymous)).build().unwrap();

        let err = client.authorize(&Endpoint::get("/me")).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized(Some("no access token".into())));
        assert!(client.authorize(&Endpoint::get("/status").public()).await.is_ok());
    }
}
