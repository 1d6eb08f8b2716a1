//! Testing utilities
//!
//! - **[`mocks`]**: in-memory credential store and scripted refresh exchange
//! - **[`fixtures`]**: structurally valid JWTs with a chosen expiry

pub mod fixtures;
pub mod mocks;

pub use fixtures::fake_jwt;
pub use mocks::{MemoryCredentialStore, ScriptedRefreshExchange};
