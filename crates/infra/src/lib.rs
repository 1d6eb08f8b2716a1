//! # Pawlink Infrastructure
//!
//! I/O side of the Pawlink API client.
//!
//! This crate contains:
//! - HTTP dispatch with a per-request timeout
//! - The request pipeline, multipart uploads and WebSocket streams
//! - Configuration loading from environment or file
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Credential lifecycle comes from `pawlink-common` (token manager, keychain)
//! - Configuration and event types come from `pawlink-domain`
//! - Contains all "impure" code (network, filesystem, environment)

pub mod api;
pub mod config;
pub mod http;
pub mod logging;

// Re-export commonly used items
pub use api::{
    ApiClient, ApiClientBuilder, ApiError, Connectivity, ConnectivityFlag, Endpoint, EventStream,
    MultipartUpload, RequestAuthenticator,
};
pub use http::HttpClient;
pub use logging::{init_tracing, LogFormat};
