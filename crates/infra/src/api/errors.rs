//! API-specific error types
//!
//! Every terminal outcome of a request, upload or stream setup is one of
//! these kinds. Variants carry the status code and raw body where one exists
//! so callers can render a specific message.

use std::time::Duration;

use pawlink_common::error::{ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Categories of API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// 401 after the refresh path gave up
    Authentication,
    /// 429 after the retry budget ran out
    RateLimit,
    /// 5xx
    Server,
    /// Other non-2xx, undecodable bodies, rejected payloads
    Client,
    /// Transport faults, timeouts, offline
    Network,
    /// Endpoint could not be turned into a request
    Config,
    Unknown,
}

/// API operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unexpected response status {status}")]
    InvalidResponse { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    DecodingFailed(String),

    #[error("server error {status}")]
    ServerError { status: u16, message: Option<String> },

    #[error("unauthorized{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Unauthorized(Option<String>),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("no network connectivity")]
    NoConnectivity,

    #[error("validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    #[error("unknown error{}", .0.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    Unknown(Option<String>),
}

impl ApiError {
    /// Get the error category for this error
    #[must_use]
    pub const fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Unauthorized(_) => ApiErrorCategory::Authentication,
            Self::RateLimited { .. } => ApiErrorCategory::RateLimit,
            Self::ServerError { .. } => ApiErrorCategory::Server,
            Self::InvalidResponse { .. } | Self::DecodingFailed(_) | Self::ValidationFailed(_) => {
                ApiErrorCategory::Client
            }
            Self::Network(_) | Self::NoConnectivity => ApiErrorCategory::Network,
            Self::InvalidEndpoint(_) => ApiErrorCategory::Config,
            Self::Unknown(_) => ApiErrorCategory::Unknown,
        }
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidResponse { status, .. } | Self::ServerError { status, .. } => {
                Some(*status)
            }
            Self::Unauthorized(_) => Some(401),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Terminal error for a non-2xx status outside the retry policy
    ///
    /// `5xx` becomes `ServerError` (message is the body when non-empty);
    /// everything else becomes `InvalidResponse` with the raw body.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        if (500..600).contains(&status) {
            let message = (!body.trim().is_empty()).then_some(body);
            Self::ServerError { status, message }
        } else {
            Self::InvalidResponse { status, body }
        }
    }

    pub(crate) fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out after {}s", timeout.as_secs()))
        } else if err.is_builder() {
            Self::InvalidEndpoint(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl ErrorClassification for ApiError {
    /// Terminal errors as seen by a caller who might resubmit later.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::NoConnectivity | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ApiErrorCategory::Network | ApiErrorCategory::RateLimit => ErrorSeverity::Warning,
            ApiErrorCategory::Authentication | ApiErrorCategory::Client => ErrorSeverity::Info,
            ApiErrorCategory::Server | ApiErrorCategory::Unknown => ErrorSeverity::Error,
            ApiErrorCategory::Config => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(ApiError::Unauthorized(None).category(), ApiErrorCategory::Authentication);
        assert_eq!(ApiError::RateLimited { attempts: 3 }.category(), ApiErrorCategory::RateLimit);
        assert_eq!(
            ApiError::ServerError { status: 503, message: None }.category(),
            ApiErrorCategory::Server
        );
        assert_eq!(ApiError::NoConnectivity.category(), ApiErrorCategory::Network);
        assert_eq!(
            ApiError::InvalidResponse { status: 404, body: String::new() }.category(),
            ApiErrorCategory::Client
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::InvalidResponse { status: 418, body: "teapot".into() }.status(), Some(418));
        assert_eq!(ApiError::RateLimited { attempts: 3 }.status(), Some(429));
        assert_eq!(ApiError::DecodingFailed("eof".into()).status(), None);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            ApiError::from_status(503, "maintenance".into()),
            ApiError::ServerError { status: 503, message: Some("maintenance".into()) }
        );
        assert_eq!(
            ApiError::from_status(500, "  ".into()),
            ApiError::ServerError { status: 500, message: None }
        );
        assert_eq!(
            ApiError::from_status(404, "no such walk".into()),
            ApiError::InvalidResponse { status: 404, body: "no such walk".into() }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ApiError::Unauthorized(None).to_string(), "unauthorized");
        assert_eq!(
            ApiError::Unauthorized(Some("token revoked".into())).to_string(),
            "unauthorized: token revoked"
        );
        assert_eq!(
            ApiError::ValidationFailed(vec!["payload".into(), "content_type".into()]).to_string(),
            "validation failed: payload, content_type"
        );
        assert_eq!(ApiError::RateLimited { attempts: 3 }.to_string(), "rate limited after 3 attempts");
    }

    #[test]
    fn test_classification() {
        assert!(ApiError::RateLimited { attempts: 3 }.is_retryable());
        assert!(!ApiError::DecodingFailed("x".into()).is_retryable());
        assert!(ApiError::InvalidEndpoint("x".into()).is_critical());
        assert_eq!(ApiError::NoConnectivity.severity(), ErrorSeverity::Warning);
    }
}
