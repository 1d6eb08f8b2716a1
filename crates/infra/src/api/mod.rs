//! Authenticated API surface
//!
//! - [`ApiClient::execute`]: request pipeline with bounded 401/429 retry
//! - [`ApiClient::upload`]: streamed multipart upload with progress
//! - [`ApiClient::subscribe`]: WebSocket event stream with liveness probe
//! - [`ApiClient::logout`]: credential invalidation
//!
//! Credentials reach every path through the [`RequestAuthenticator`] seam,
//! implemented by the shared token manager.

pub mod auth;
pub mod client;
pub mod connectivity;
pub mod endpoint;
pub mod errors;
pub mod stream;
pub mod upload;

pub use auth::{keychain_token_manager, RequestAuthenticator};
pub use client::{ApiClient, ApiClientBuilder};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use endpoint::Endpoint;
pub use errors::{ApiError, ApiErrorCategory};
pub use stream::EventStream;
pub use upload::MultipartUpload;
