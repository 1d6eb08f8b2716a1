//! # Pawlink Domain
//!
//! Domain types shared by every Pawlink client crate.
//!
//! This crate contains:
//! - Domain error types and Result definitions
//! - Client configuration structures and their defaults
//! - Transport-independent event and progress types
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Pawlink crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
