// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bounded retry with exponential backoff.
//!
//! Used for two independent retry policies:
//! - provider API calls (throttling and transient failures, a few attempts)
//! - subnet-scoped address resolution (fixed short delay between attempts)
//!
//! Unlike an elapsed-time budget, every policy here is bounded by an attempt
//! count, so the total number of calls is known up front.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::constants::{PROVIDER_RETRY_INITIAL_MILLIS, RESOLVE_RETRY_DELAY_MILLIS};

/// Maximum interval between provider retries (5 seconds)
const PROVIDER_MAX_INTERVAL_SECS: u64 = 5;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Backoff multiplier (1.0 for a fixed delay)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier,
            randomization_factor,
        }
    }

    /// Constant delay between attempts, no jitter.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0, 0.0)
    }

    /// Get the next backoff interval and advance the schedule.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        // random::<f64>() is uniform in [0, 1)
        let jittered = secs - delta + rand::random::<f64>() * 2.0 * delta;

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff between provider API attempts.
///
/// # Retry Schedule
///
/// 1. 500ms
/// 2. 1s
/// 3. 2s
/// 4. 4s
/// 5. 5s (capped at max interval)
#[must_use]
pub fn provider_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(PROVIDER_RETRY_INITIAL_MILLIS),
        Duration::from_secs(PROVIDER_MAX_INTERVAL_SECS),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Fixed delay between address resolution attempts (200ms).
#[must_use]
pub fn resolve_backoff() -> ExponentialBackoff {
    ExponentialBackoff::fixed(Duration::from_millis(RESOLVE_RETRY_DELAY_MILLIS))
}

/// Retry an async operation up to `max_attempts` times.
///
/// Errors for which `is_retryable` returns false fail immediately. After the
/// last attempt the final error is returned unchanged.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
///
/// # Example
///
/// ```no_run
/// use popdns::reconcilers::retry::{provider_backoff, retry_with_attempts};
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let value = retry_with_attempts(
///     3,
///     provider_backoff(),
///     "fetch value",
///     |_e: &std::io::Error| true,
///     || async { Ok::<_, std::io::Error>(42) },
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_attempts<T, E, F, Fut, R>(
    max_attempts: u32,
    mut backoff: ExponentialBackoff,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(e);
                }

                if attempt >= max_attempts {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Retry attempts exhausted, giving up"
                    );
                    return Err(e);
                }

                let duration = backoff.next_backoff();
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Retryable error, will retry"
                );
                tokio::time::sleep(duration).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
