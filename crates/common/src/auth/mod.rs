//! Credential lifecycle
//!
//! Keeps an access/refresh token pair current for an API client: loads it
//! from the secure store, refreshes the access token ahead of expiry with at
//! most one exchange in flight, and clears everything on logout.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  TokenManager   │  State owner, single-flight refresh
//! └────────┬────────┘
//!          │
//!          ├──► RefreshExchange   (HttpRefreshClient: token endpoint)
//!          └──► CredentialStore   (KeychainProvider: platform keychain)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use pawlink_common::auth::{HttpRefreshClient, TokenManager};
//! use pawlink_common::security::KeychainProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exchange = HttpRefreshClient::new(
//!         "https://auth.pawlink.app/oauth/token",
//!         "mobile",
//!         Duration::from_secs(30),
//!     )?;
//!     let store = Arc::new(KeychainProvider::new("Pawlink.api"));
//!     let manager = TokenManager::new(exchange, store, "main", 300);
//!
//!     manager.initialize().await?;
//!     if let Some(token) = manager.access_token_for_dispatch().await {
//!         println!("token ready ({} chars)", token.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`types`]**: `CredentialState`, `TokenSet`, token endpoint payloads
//! - **[`token`]**: JWT shape and `exp` claim helpers
//! - **[`client`]**: HTTP refresh exchange
//! - **[`token_manager`]**: lifecycle owner
//! - **[`traits`]**: `CredentialStore` and `RefreshExchange` seams

pub mod client;
pub mod keychain;
pub mod token;
pub mod token_manager;
pub mod traits;
pub mod types;

pub use client::{HttpRefreshClient, RefreshClientError};
pub use keychain::CredentialKeys;
pub use token_manager::{TokenManager, TokenManagerError};
pub use traits::{CredentialStore, RefreshExchange};
pub use types::{CredentialState, OAuthError, TokenResponse, TokenSet};
