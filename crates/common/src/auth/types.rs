//! Credential types
//!
//! Defines the in-memory credential pair, the token set produced by a
//! refresh exchange, and the wire shapes of the identity provider's token
//! endpoint.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::token;

/// Current access/refresh pair and the expiry tracked for the access token
///
/// `access_token` and `expires_at` are only ever replaced together. An absent
/// `expires_at` means "unknown" and is treated as near expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    /// Bearer token attached to authenticated calls
    pub access_token: Option<String>,

    /// Token used solely to mint a new access token
    pub refresh_token: Option<String>,

    /// Absolute expiry of `access_token` (UTC)
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialState {
    /// Whether no credential material is held at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }

    /// Whether the access token is absent, of unknown lifetime, or expires
    /// within `buffer_seconds`
    #[must_use]
    pub fn is_near_expiry(&self, buffer_seconds: i64) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(buffer_seconds) >= expires_at,
            None => true,
        }
    }

    /// Seconds until the access token expires, if the expiry is known
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }

    /// Install a freshly minted token set, keeping the previous refresh token
    /// when the identity provider did not rotate it
    pub(crate) fn apply(&mut self, tokens: TokenSet) {
        let TokenSet { access_token, refresh_token, expires_at, .. } = tokens;
        self.access_token = Some(access_token);
        self.expires_at = expires_at;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }
}

/// Token set minted by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// JWT access token for API authentication
    pub access_token: String,

    /// Rotated refresh token, when the provider issues one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (always "Bearer" for this API)
    pub token_type: String,

    /// Absolute expiration timestamp (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Create a token set, deriving `expires_at`
    ///
    /// A positive `expires_in` wins; otherwise the access token's own `exp`
    /// claim is used; otherwise the expiry stays unknown.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> Self {
        let expires_at = match expires_in {
            Some(seconds) if seconds > 0 => Some(Utc::now() + Duration::seconds(seconds)),
            _ => token::expiry_claim(&access_token),
        };

        Self { access_token, refresh_token, token_type: "Bearer".to_string(), expires_at }
    }

    /// Create a token set with an explicit expiry
    #[must_use]
    pub fn with_expiry(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { access_token, refresh_token, token_type: "Bearer".to_string(), expires_at }
    }
}

/// Successful response of the token endpoint (RFC 6749 §5.1)
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        let mut tokens = Self::new(response.access_token, response.refresh_token, response.expires_in);
        if let Some(token_type) = response.token_type {
            tokens.token_type = token_type;
        }
        tokens
    }
}

/// Error response of the token endpoint (RFC 6749 §5.2)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for OAuthError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_jwt;

    #[test]
    fn test_near_expiry_uses_buffer() {
        let state = CredentialState {
            access_token: Some("a".into()),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::seconds(60)),
        };
        assert!(state.is_near_expiry(300));
        assert!(!state.is_near_expiry(30));
    }

    #[test]
    fn test_unknown_expiry_counts_as_near() {
        let state = CredentialState {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            expires_at: None,
        };
        assert!(state.is_near_expiry(0));
        assert!(CredentialState::default().is_near_expiry(0));
    }

    #[test]
    fn test_apply_keeps_unrotated_refresh_token() {
        let mut state = CredentialState {
            access_token: Some("old".into()),
            refresh_token: Some("refresh-1".into()),
            expires_at: None,
        };
        state.apply(TokenSet::new("new".into(), None, Some(3600)));
        assert_eq!(state.access_token.as_deref(), Some("new"));
        assert_eq!(state.refresh_token.as_deref(), Some("refresh-1"));
        assert!(state.expires_at.is_some());

        state.apply(TokenSet::new("newer".into(), Some("refresh-2".into()), Some(3600)));
        assert_eq!(state.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[test]
    fn test_expiry_falls_back_to_exp_claim() {
        let exp = Utc::now().timestamp() + 900;
        let tokens = TokenSet::new(fake_jwt(exp), None, None);
        assert_eq!(tokens.expires_at.map(|dt| dt.timestamp()), Some(exp));

        let opaque = TokenSet::new("opaque".into(), None, Some(0));
        assert!(opaque.expires_at.is_none());
    }

    #[test]
    fn test_token_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"bearer","expires_in":120}"#,
        )
        .unwrap();
        let tokens: TokenSet = response.into();
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(tokens.token_type, "bearer");
        assert!(tokens.refresh_token.is_none());
        let remaining = (tokens.expires_at.unwrap() - Utc::now()).num_seconds();
        assert!((115..=120).contains(&remaining));
    }

    #[test]
    fn test_oauth_error_display() {
        let err = OAuthError {
            error: "invalid_grant".into(),
            error_description: Some("refresh token revoked".into()),
        };
        assert_eq!(err.to_string(), "invalid_grant: refresh token revoked");
    }
}
