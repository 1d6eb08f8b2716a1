//! Resilience primitives
//!
//! Exponential backoff and a per-call attempt budget. The API client's
//! execution loop decides *which* failures are retried; this module only
//! answers *how long* to wait and *whether* the budget allows another try.

pub mod retry;

pub use retry::{BackoffStrategy, RetryContext};
