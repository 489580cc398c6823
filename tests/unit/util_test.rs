//! Tests for utility functions

use std::time::Duration;

use throttled_dispatch::util::{hour_bucket_start, next_hour_start, Clock, ManualClock, HOUR_MS};

#[test]
fn test_hour_bucket_boundaries() {
    let top = 1_704_103_200_000; // 2024-01-01T10:00:00Z
    assert_eq!(hour_bucket_start(top), top);
    assert_eq!(hour_bucket_start(top + HOUR_MS - 1), top);
    assert_eq!(hour_bucket_start(top + HOUR_MS), top + HOUR_MS);
    assert_eq!(next_hour_start(top + 1), top + HOUR_MS);
}

#[test]
fn test_manual_clock_advance() {
    let clock = ManualClock::new(0);
    clock.advance(Duration::from_millis(1_500));
    assert_eq!(clock.now_ms(), 1_500);
    clock.advance(Duration::from_secs(3_600));
    assert_eq!(clock.now_ms(), 3_601_500);
}

#[test]
fn test_init_tracing_is_idempotent() {
    throttled_dispatch::util::init_tracing();
    throttled_dispatch::util::init_tracing_with("throttled_dispatch=debug");
}
