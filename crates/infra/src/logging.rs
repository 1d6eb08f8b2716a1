//! Tracing setup and call outcome logging

use std::time::Duration;

use pawlink_domain::impl_string_enum_conversions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ApiError;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl_string_enum_conversions!(LogFormat {
    Pretty => "pretty",
    Json => "json",
});

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Returns `false` when
/// a subscriber was already installed, which leaves the existing one active.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

/// Log the outcome of one logical call with structured fields.
///
/// `endpoint` is the endpoint target; callers must not pass URLs carrying
/// credentials.
#[inline]
pub fn log_call_outcome<T>(
    endpoint: &str,
    attempts: u32,
    elapsed: Duration,
    result: &Result<T, ApiError>,
) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(_) => info!(endpoint, attempts, duration_ms, "api_call_success"),
        Err(err) => warn!(
            endpoint,
            attempts,
            duration_ms,
            error = error_label(err),
            status = err.status(),
            "api_call_failure"
        ),
    }
}

/// Convert an `ApiError` into a stable label suitable for logging.
#[inline]
pub const fn error_label(error: &ApiError) -> &'static str {
    match error {
        ApiError::Network(_) => "network",
        ApiError::InvalidEndpoint(_) => "invalid_endpoint",
        ApiError::InvalidResponse { .. } => "invalid_response",
        ApiError::DecodingFailed(_) => "decoding_failed",
        ApiError::ServerError { .. } => "server_error",
        ApiError::Unauthorized(_) => "unauthorized",
        ApiError::RateLimited { .. } => "rate_limited",
        ApiError::NoConnectivity => "no_connectivity",
        ApiError::ValidationFailed(_) => "validation_failed",
        ApiError::Unknown(_) => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::default().to_string(), "pretty");
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_error_labels_are_stable() {
        assert_eq!(error_label(&ApiError::RateLimited { attempts: 3 }), "rate_limited");
        assert_eq!(error_label(&ApiError::NoConnectivity), "no_connectivity");
        assert_eq!(
            error_label(&ApiError::ServerError { status: 502, message: None }),
            "server_error"
        );
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing(LogFormat::Pretty);
        assert!(!init_tracing(LogFormat::Json));
    }
}
