//! Secure credential storage backed by the platform keychain

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider};
