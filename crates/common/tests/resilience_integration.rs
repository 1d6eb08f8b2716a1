//! Integration tests for resilience module

#![cfg(feature = "runtime")]

use std::time::Duration;

use pawlink_common::resilience::{BackoffStrategy, RetryContext};

/// Validates that a retry loop driven by `RetryContext` dispatches exactly
/// `max_attempts` times and accumulates the `base^(n-1)` schedule.
#[tokio::test]
async fn test_retry_loop_honours_budget() {
    let backoff = BackoffStrategy::exponential(Duration::from_millis(5), 2.0);
    let mut ctx = RetryContext::new(3, backoff);
    let mut dispatched = 0;

    loop {
        ctx.begin_attempt();
        dispatched += 1;
        if !ctx.can_retry() {
            break;
        }
        tokio::time::sleep(ctx.next_delay()).await;
    }

    assert_eq!(dispatched, 3);
    assert_eq!(ctx.total_delay, Duration::from_millis(15));
}

#[test]
fn test_unit_base_gives_constant_delay() {
    let backoff = BackoffStrategy::exponential(Duration::from_millis(250), 1.0);
    for attempt in 1..=5 {
        assert_eq!(backoff.delay_after(attempt), Duration::from_millis(250));
    }
}
