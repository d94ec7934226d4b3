//! Integration tests for the dual-window rate limiter

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use report_segment_downloader::downloader::{RateLimitConfig, RateLimitSnapshot, RateLimiter};

#[tokio::test(start_paused = true)]
async fn test_default_budgets_are_buffered() {
    let limiter = RateLimiter::new(&RateLimitConfig::default());
    assert_eq!(
        limiter.snapshot().await,
        RateLimitSnapshot {
            hourly_remaining: 970,
            per_minute_remaining: 97,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_per_minute_budget_blocks_until_window_resets() {
    let limiter = RateLimiter::with_windows(
        100,
        Duration::from_secs(3600),
        3,
        Duration::from_secs(60),
        Duration::from_secs(1),
    );
    let started = Instant::now();

    for _ in 0..3 {
        limiter.acquire().await;
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!limiter.try_acquire().await);

    limiter.acquire().await;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(60), "reset came early: {waited:?}");
    assert!(waited <= Duration::from_secs(61));

    let snapshot = limiter.snapshot().await;
    assert_eq!(snapshot.per_minute_remaining, 2);
    assert_eq!(snapshot.hourly_remaining, 96);
}

#[tokio::test(start_paused = true)]
async fn test_hourly_budget_gates_even_with_minute_capacity() {
    let limiter = RateLimiter::with_windows(
        2,
        Duration::from_secs(3600),
        50,
        Duration::from_secs(60),
        Duration::from_secs(1),
    );
    let started = Instant::now();

    limiter.acquire().await;
    limiter.acquire().await;
    limiter.acquire().await;

    assert!(started.elapsed() >= Duration::from_secs(3600));
}

#[tokio::test(start_paused = true)]
async fn test_remaining_never_negative_under_contention() {
    let limiter = Arc::new(RateLimiter::with_windows(
        1_000,
        Duration::from_secs(3600),
        5,
        Duration::from_secs(60),
        Duration::from_secs(1),
    ));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        })
        .collect();

    let start = Instant::now();
    let mut admitted = Vec::new();
    for task in tasks {
        admitted.push(task.await.unwrap() - start);
    }

    // 5 in the first window, 5 in the second, 2 in the third
    let first = admitted.iter().filter(|d| **d < Duration::from_secs(60)).count();
    let second = admitted
        .iter()
        .filter(|d| **d >= Duration::from_secs(60) && **d < Duration::from_secs(120))
        .count();
    assert_eq!(first, 5);
    assert_eq!(second, 5);
    assert_eq!(admitted.len(), 12);

    let snapshot = limiter.snapshot().await;
    assert!(snapshot.per_minute_remaining <= 5);
    assert_eq!(snapshot.hourly_remaining, 1_000 - 12);
}
