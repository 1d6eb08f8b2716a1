//! Client configuration structures
//!
//! Loaded from the environment or a TOML/JSON file by `pawlink-infra`'s
//! config loader. Every section has serde defaults equal to the constants in
//! [`crate::constants`], so a minimal file only names the two URLs and the
//! OAuth client id.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACCOUNT, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_UNIT_MS, DEFAULT_KEYCHAIN_SERVICE,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_PROBE_WRITE_TIMEOUT_SECS,
    DEFAULT_REFRESH_BUFFER_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_BUFFER,
    DEFAULT_UPLOAD_CHUNK_SIZE,
};
use crate::errors::{PawlinkError, Result};

/// Top-level configuration for the API client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every relative endpoint path is resolved against
    pub base_url: String,

    /// Per-dispatch timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional `User-Agent` header value
    #[serde(default)]
    pub user_agent: Option<String>,

    pub auth: AuthConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

impl ClientConfig {
    /// Create a configuration with default retry/stream/upload sections
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: None,
            auth,
            retry: RetryConfig::default(),
            stream: StreamConfig::default(),
            upload: UploadConfig::default(),
        }
    }

    /// Per-dispatch timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the configuration for values the client cannot operate with
    ///
    /// # Errors
    /// Returns `PawlinkError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PawlinkError::Config("base_url must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(PawlinkError::Config("request_timeout_secs must be positive".into()));
        }
        self.auth.validate()?;
        self.retry.validate()?;
        self.stream.validate()?;
        self.upload.validate()
    }
}

/// Credential lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity provider token endpoint used for the refresh exchange
    pub token_url: String,

    /// OAuth client identifier sent with refresh requests
    pub client_id: String,

    /// Secure store service namespace
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,

    /// Account name the credential pair is stored under
    #[serde(default = "default_account")]
    pub account: String,

    /// Seconds before expiry at which a token counts as near expiry
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: i64,

    /// Fail locally instead of dispatching when no token survives a refresh
    /// attempt. Off by default: the server's 401 drives recovery.
    #[serde(default)]
    pub fail_fast_without_token: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            keychain_service: default_keychain_service(),
            account: default_account(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            fail_fast_without_token: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.token_url.trim().is_empty() {
            return Err(PawlinkError::Config("auth.token_url must not be empty".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(PawlinkError::Config("auth.client_id must not be empty".into()));
        }
        if self.account.trim().is_empty() {
            return Err(PawlinkError::Config("auth.account must not be empty".into()));
        }
        if self.refresh_buffer_secs < 0 {
            return Err(PawlinkError::Config("auth.refresh_buffer_secs must not be negative".into()));
        }
        Ok(())
    }
}

/// Retry policy for authorization and rate-limit failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Hard upper bound on dispatch attempts per logical call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff multiplier; the wait after attempt `n` is `base^(n-1)` units
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Length of one backoff unit in milliseconds (one second by default)
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PawlinkError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(PawlinkError::Config("retry.backoff_base must be >= 1.0".into()));
        }
        Ok(())
    }
}

/// Streaming channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    #[serde(default = "default_probe_write_timeout_secs")]
    pub probe_write_timeout_secs: u64,

    /// Capacity of the event queue between the socket task and the consumer
    #[serde(default = "default_stream_buffer")]
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            probe_write_timeout_secs: DEFAULT_PROBE_WRITE_TIMEOUT_SECS,
            buffer_size: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    #[must_use]
    pub fn probe_write_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_write_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.probe_interval_secs == 0 {
            return Err(PawlinkError::Config("stream.probe_interval_secs must be positive".into()));
        }
        if self.buffer_size == 0 {
            return Err(PawlinkError::Config("stream.buffer_size must be positive".into()));
        }
        Ok(())
    }
}

/// Upload pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size of each streamed payload slice in bytes
    #[serde(default = "default_upload_chunk_size")]
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE }
    }
}

impl UploadConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PawlinkError::Config("upload.chunk_size must be positive".into()));
        }
        Ok(())
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_keychain_service() -> String {
    DEFAULT_KEYCHAIN_SERVICE.to_string()
}

fn default_account() -> String {
    DEFAULT_ACCOUNT.to_string()
}

fn default_refresh_buffer_secs() -> i64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base() -> f64 {
    DEFAULT_BACKOFF_BASE
}

fn default_backoff_unit_ms() -> u64 {
    DEFAULT_BACKOFF_UNIT_MS
}

fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

fn default_probe_write_timeout_secs() -> u64 {
    DEFAULT_PROBE_WRITE_TIMEOUT_SECS
}

fn default_stream_buffer() -> usize {
    DEFAULT_STREAM_BUFFER
}

fn default_upload_chunk_size() -> usize {
    DEFAULT_UPLOAD_CHUNK_SIZE
}
