//! HTTP refresh exchange against an OAuth 2.0 token endpoint
//!
//! Posts `grant_type=refresh_token` as a form (RFC 6749 §6) and converts the
//! JSON answer into a [`TokenSet`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::traits::RefreshExchange;
use super::types::{OAuthError, TokenResponse, TokenSet};

/// Error type for refresh exchanges
#[derive(Debug, Error)]
pub enum RefreshClientError {
    /// The token endpoint could not be reached
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The identity provider rejected the refresh token
    #[error("identity provider rejected refresh (HTTP {status}): {error}")]
    Rejected { status: u16, error: OAuthError },

    /// The response body was not a token response
    #[error("unreadable token response: {0}")]
    Parse(String),

    /// Called without a refresh token
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The HTTP client could not be built
    #[error("refresh client configuration error: {0}")]
    Config(String),
}

impl RefreshClientError {
    /// Whether the refresh token itself was refused
    ///
    /// True for 4xx answers other than 408 and 429. Retrying with the same
    /// refresh token cannot succeed after one of these.
    #[must_use]
    pub fn is_irrecoverable(&self) -> bool {
        matches!(self, Self::Rejected { status, .. }
            if (400..500).contains(status) && !matches!(status, 408 | 429))
    }
}

impl From<reqwest::Error> for RefreshClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Refresh exchange backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpRefreshClient {
    client: Client,
    token_url: String,
    client_id: String,
}

impl HttpRefreshClient {
    /// Create a refresh client for `token_url`
    ///
    /// # Errors
    /// Returns `RefreshClientError::Config` if the HTTP client cannot be built
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RefreshClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshClientError::Config(e.to_string()))?;

        Ok(Self { client, token_url: token_url.into(), client_id: client_id.into() })
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl RefreshExchange for HttpRefreshClient {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenSet, RefreshClientError> {
        if refresh_token.is_empty() {
            return Err(RefreshClientError::NoRefreshToken);
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        debug!(token_url = %self.token_url, "exchanging refresh token");
        let response = self.client.post(&self.token_url).form(&params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(error = %e, "failed to read token endpoint error body");
                    String::new()
                }
            };
            let error = serde_json::from_str::<OAuthError>(&body).unwrap_or_else(|_| OAuthError {
                error: "http_error".to_string(),
                error_description: (!body.is_empty()).then_some(body),
            });
            warn!(status = status.as_u16(), error = %error, "token endpoint rejected refresh");
            return Err(RefreshClientError::Rejected { status: status.as_u16(), error });
        }

        let token_response: TokenResponse =
            response.json().await.map_err(|e| RefreshClientError::Parse(e.to_string()))?;

        Ok(token_response.into())
    }
}
