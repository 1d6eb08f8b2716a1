//! Client constants
//!
//! Reference defaults for retry, credential, streaming and upload behaviour.
//! Every value here is surfaced through [`crate::config::ClientConfig`] so
//! deployments can override it; none of them is a per-call parameter.

// Retry policy
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1_000;

// Transport
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Credentials
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "Pawlink.api";
pub const DEFAULT_ACCOUNT: &str = "main";

// Streaming channel
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_PROBE_WRITE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STREAM_BUFFER: usize = 256;

// Uploads
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
pub const UPLOAD_FORM_FIELD: &str = "file";
