// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sliding-window rate limiter for provider API calls.
//!
//! Keeps the timestamps of recent calls. Before a call, entries older than
//! the window are pruned; if the window is still full the caller sleeps until
//! the oldest entry leaves it. The timestamp is recorded after the call
//! completes, whether it succeeded or not.
//!
//! The limiter is a plain owned value. Callers that share it between tasks
//! wrap it in a `tokio::sync::Mutex` and hold the lock across
//! acquire/call/record so call starts are serialized.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::constants::{PROVIDER_MAX_CALLS_PER_WINDOW, PROVIDER_RATE_WINDOW_MILLIS};

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    /// Allow at most `max_calls` per `window`. A cap of 0 is raised to 1.
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            calls: VecDeque::with_capacity(max_calls),
        }
    }

    /// Allow at most `max_calls` per second.
    #[must_use]
    pub fn per_second(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_millis(PROVIDER_RATE_WINDOW_MILLIS))
    }

    #[must_use]
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.duration_since(*oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Calls recorded within the trailing window.
    pub fn in_window(&mut self) -> usize {
        self.prune(Instant::now());
        self.calls.len()
    }

    /// Wait until a call may start. Returns how long the caller waited.
    pub async fn acquire(&mut self) -> Duration {
        let started = Instant::now();
        loop {
            let now = Instant::now();
            self.prune(now);
            if self.calls.len() < self.max_calls {
                return now.duration_since(started);
            }
            let Some(oldest) = self.calls.front().copied() else {
                return now.duration_since(started);
            };
            let until = oldest + self.window;
            debug!(
                in_window = self.calls.len(),
                wait = ?until.duration_since(now),
                "Rate limit reached, waiting"
            );
            tokio::time::sleep_until(until).await;
        }
    }

    /// Record a completed call.
    pub fn record(&mut self) {
        self.calls.push_back(Instant::now());
    }

    /// Run `call` under the limit. Returns its output and the time spent
    /// waiting for a free slot.
    pub async fn run<F, T>(&mut self, call: F) -> (T, Duration)
    where
        F: Future<Output = T>,
    {
        let waited = self.acquire().await;
        let output = call.await;
        self.record();
        (output, waited)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(PROVIDER_MAX_CALLS_PER_WINDOW)
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod rate_limit_tests;
