//! Bounded retry bookkeeping with exponential backoff
//!
//! Attempts are numbered from 1. After failed attempt `n` the caller waits
//! `unit * base^(n-1)`: with the defaults (base 2.0, unit 1s) that is 1s after
//! the first attempt and 2s after the second. Nothing here sleeps; callers
//! own the clock.

use std::time::Duration;

/// Exponential backoff: `unit * base^(attempt - 1)`, optionally capped
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    pub unit: Duration,
    pub base: f64,
    pub max_delay: Option<Duration>,
}

impl BackoffStrategy {
    #[must_use]
    pub fn exponential(unit: Duration, base: f64) -> Self {
        Self { unit, base, max_delay: None }
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after the given (1-based) failed attempt
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.unit.as_secs_f64() * self.base.powi(exponent);
        let delay = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// State of one logical call's retry budget
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts dispatched so far
    pub attempt: u32,
    /// Hard upper bound on attempts
    pub max_attempts: u32,
    /// Sum of backoff delays handed out
    pub total_delay: Duration,
    backoff: BackoffStrategy,
}

impl RetryContext {
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self { attempt: 0, max_attempts, total_delay: Duration::ZERO, backoff }
    }

    /// Record a dispatch and return its 1-based attempt number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Whether another attempt fits in the budget
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Delay before the next attempt, accounting it in `total_delay`
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.backoff.delay_after(self.attempt);
        self.total_delay = self.total_delay.saturating_add(delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_schedule() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), 2.0);
        assert_eq!(backoff.delay_after(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_after(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_cap_applies() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), 10.0)
            .with_max_delay(Duration::from_secs(30));
        assert_eq!(backoff.delay_after(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(30));
    }

    #[test]
    fn test_huge_exponent_saturates() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), 2.0);
        assert_eq!(backoff.delay_after(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_context_budget() {
        let mut ctx =
            RetryContext::new(3, BackoffStrategy::exponential(Duration::from_millis(10), 2.0));
        assert_eq!(ctx.begin_attempt(), 1);
        assert!(ctx.can_retry());
        assert_eq!(ctx.next_delay(), Duration::from_millis(10));
        assert_eq!(ctx.begin_attempt(), 2);
        assert_eq!(ctx.next_delay(), Duration::from_millis(20));
        assert_eq!(ctx.begin_attempt(), 3);
        assert!(!ctx.can_retry());
        assert_eq!(ctx.total_delay, Duration::from_millis(30));
    }

    #[test]
    fn test_single_attempt_budget() {
        let mut ctx = RetryContext::new(1, BackoffStrategy::exponential(Duration::from_secs(1), 2.0));
        ctx.begin_attempt();
        assert!(!ctx.can_retry());
    }
}
