use std::time::Duration;

use pawlink_domain::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use pawlink_domain::PawlinkError;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, Url};
use tracing::debug;

use crate::api::ApiError;

/// Timeout-bound HTTP dispatcher.
///
/// Sends each request exactly once. Retry policy lives in the API client,
/// which only retries on authorization and rate-limit statuses.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    /// Returns `PawlinkError::Config` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, PawlinkError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch the request once; transport faults become `ApiError::Network`.
    ///
    /// # Errors
    /// Returns `ApiError::Network` on DNS, TLS, connect or timeout failures.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build().map_err(|err| ApiError::from_transport(&err, self.timeout))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %redact(&url), "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, url = %redact(&url), status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, url = %redact(&url), error = %err, "HTTP request failed");
                Err(ApiError::from_transport(&err, self.timeout))
            }
        }
    }
}

/// URL without its query string, which may carry identifiers.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: None,
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// Returns `PawlinkError::Config` if the reqwest client cannot be built.
    pub fn build(self) -> Result<HttpClient, PawlinkError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|err| PawlinkError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpClient { client, timeout: self.timeout })
    }
}
