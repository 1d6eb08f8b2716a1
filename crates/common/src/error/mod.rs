//! Error classification shared by every Pawlink error type
//!
//! Errors across the workspace describe themselves through
//! [`ErrorClassification`] so retry loops and logging can treat them
//! uniformly without matching on concrete variants.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use pawlink_common::error::{ErrorClassification, ErrorSeverity};
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Throttled,
//!     Corrupt,
//! }
//!
//! impl ErrorClassification for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, Self::Throttled)
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         match self {
//!             Self::Throttled => ErrorSeverity::Warning,
//!             Self::Corrupt => ErrorSeverity::Critical,
//!         }
//!     }
//!
//!     fn is_critical(&self) -> bool {
//!         matches!(self, Self::Corrupt)
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         None
//!     }
//! }
//!
//! assert!(FetchError::Throttled.is_retryable());
//! assert_eq!(FetchError::Corrupt.severity().to_string(), "CRITICAL");
//! ```

use std::fmt;
use std::time::Duration;

/// Uniform description of an error for retry and alerting decisions
pub trait ErrorClassification {
    /// Whether the operation may succeed if attempted again
    ///
    /// Transient conditions (rate limiting, expired credentials that a
    /// refresh can replace, timeouts) are retryable.
    fn is_retryable(&self) -> bool;

    /// Severity used for log levels and alerting
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error indicates a broken invariant or security issue
    fn is_critical(&self) -> bool;

    /// Suggested wait before retrying, if the error carries one
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
