// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rate-limited, retrying access to the DNS provider.
//!
//! Every provider call goes through the client's [`RateLimiter`] and a
//! bounded retry. The limiter sits behind a `tokio::sync::Mutex` so passes
//! running on separate tasks share one sliding window.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::PROVIDER_MAX_ATTEMPTS;
use crate::dns_errors::ProviderError;
use crate::metrics;
use crate::provider::{DnsProvider, ListCursor, RecordPage};
use crate::reconcilers::rate_limit::RateLimiter;
use crate::reconcilers::retry::{provider_backoff, retry_with_attempts, ExponentialBackoff};
use crate::records::ChangeBatch;

/// Provider client bound to one hosted zone.
pub struct ApplyClient {
    provider: Arc<dyn DnsProvider>,
    zone_id: String,
    limiter: Mutex<RateLimiter>,
    max_attempts: u32,
    backoff: ExponentialBackoff,
}

impl ApplyClient {
    #[must_use]
    pub fn new(provider: Arc<dyn DnsProvider>, zone_id: impl Into<String>, limiter: RateLimiter) -> Self {
        Self {
            provider,
            zone_id: zone_id.into(),
            limiter: Mutex::new(limiter),
            max_attempts: PROVIDER_MAX_ATTEMPTS,
            backoff: provider_backoff(),
        }
    }

    /// Override the retry budget and backoff.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff: ExponentialBackoff) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    /// Submit one change batch.
    ///
    /// # Errors
    ///
    /// Returns the last provider error once retries are exhausted, or the
    /// first non-retryable one.
    pub async fn apply(&self, batch: &ChangeBatch) -> Result<(), ProviderError> {
        let provider = &self.provider;
        let zone_id = self.zone_id.as_str();

        let result = retry_with_attempts(
            self.max_attempts,
            self.backoff.clone(),
            "change record sets",
            ProviderError::is_retryable,
            || async move {
                self.limited("change", provider.change_records(zone_id, batch))
                    .await
            },
        )
        .await;

        if result.is_ok() {
            debug!(
                zone_id = %zone_id,
                changes = batch.len(),
                records = batch.record_count(),
                "Applied change batch"
            );
        }
        result
    }

    /// Fetch one page of the zone listing.
    ///
    /// # Errors
    ///
    /// Returns the last provider error once retries are exhausted, or the
    /// first non-retryable one.
    pub async fn list_page(&self, cursor: Option<&ListCursor>) -> Result<RecordPage, ProviderError> {
        let provider = &self.provider;
        let zone_id = self.zone_id.as_str();

        retry_with_attempts(
            self.max_attempts,
            self.backoff.clone(),
            "list record sets",
            ProviderError::is_retryable,
            || async move {
                self.limited("list", provider.list_records(zone_id, cursor))
                    .await
            },
        )
        .await
    }

    async fn limited<F, T>(&self, operation: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let (result, waited) = self.limiter.lock().await.run(call).await;
        if waited > Duration::ZERO {
            metrics::record_rate_limit_wait(waited);
        }
        metrics::record_provider_call(operation, result.is_ok());
        result
    }
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod apply_tests;
