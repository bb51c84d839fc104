// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{provider_backoff, resolve_backoff, retry_with_attempts, ExponentialBackoff};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Test that provider backoff configuration has expected values
    #[test]
    fn test_provider_backoff_configuration() {
        let backoff = provider_backoff();

        assert_eq!(
            backoff.initial_interval,
            Duration::from_millis(500),
            "Initial interval should be 500ms"
        );
        assert_eq!(
            backoff.max_interval,
            Duration::from_secs(5),
            "Max interval should be 5 seconds"
        );

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(backoff.multiplier, 2.0);
            assert_eq!(backoff.randomization_factor, 0.1);
        }
    }

    /// Test that jitter stays within ±10% and the interval grows to the cap
    #[test]
    fn test_backoff_growth_with_jitter() {
        let mut backoff = provider_backoff();

        for expected_ms in [500u64, 1000, 2000, 4000, 5000, 5000] {
            let actual = backoff.next_backoff().as_secs_f64() * 1000.0;
            #[allow(clippy::cast_precision_loss)]
            let expected = expected_ms as f64;
            assert!(
                actual >= expected * 0.9 - 0.001 && actual <= expected * 1.1 + 0.001,
                "Interval {actual}ms should be within 10% of {expected}ms"
            );
        }
    }

    #[test]
    fn test_resolve_backoff_is_fixed() {
        let mut backoff = resolve_backoff();
        for _ in 0..4 {
            assert_eq!(backoff.next_backoff(), Duration::from_millis(200));
        }
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(3), 2.0, 0.0);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = retry_with_attempts(
            3,
            provider_backoff(),
            "flaky call",
            |_e: &String| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("failure {n}"))
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_attempts(
            3,
            resolve_backoff(),
            "always failing",
            |_e: &String| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "Should stop at the attempt budget");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_attempts(
            5,
            provider_backoff(),
            "rejected call",
            |e: &String| e != "rejected",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("rejected".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_attempts(
            0,
            resolve_backoff(),
            "single",
            |_e: &String| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
