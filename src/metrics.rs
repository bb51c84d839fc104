// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for popdns.
//!
//! All metrics share the `popdns` namespace prefix.
//!
//! # Metrics Categories
//!
//! - **Pass Metrics** - reconciliation passes by kind and status, pass duration
//! - **Change Metrics** - resolved changes by location outcome, resolution failures
//! - **Provider Metrics** - applied batches, provider calls, rate-limit waits
//!
//! In watch mode the registry is exposed over HTTP by [`serve_metrics`].
//!
//! # Example
//!
//! ```rust,no_run
//! use popdns::metrics::record_pass;
//!
//! record_pass("sync", "completed", std::time::Duration::from_secs(3));
//! ```

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info};

use crate::constants::METRICS_SERVER_PATH;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all popdns metrics
const METRICS_NAMESPACE: &str = "popdns";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Pass Metrics
// ============================================================================

/// Total number of reconciliation passes
///
/// Labels:
/// - `kind`: `sync`, `cleanup`
/// - `status`: `completed`, `superseded`, `failed`
pub static PASSES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_passes_total"),
        "Total number of reconciliation passes by kind and status",
    );
    let counter = CounterVec::new(opts, &["kind", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation passes in seconds
///
/// Labels:
/// - `kind`: `sync`, `cleanup`
pub static PASS_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_pass_duration_seconds"),
        "Duration of reconciliation passes in seconds by kind",
    )
    .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]);
    let histogram = HistogramVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Change Metrics
// ============================================================================

/// Total number of resolved changes by location outcome
///
/// Labels:
/// - `record_type`: `A`, `AAAA`
/// - `outcome`: `matched`, `neighbor`, `mismatch`, `not_validated`
pub static RESOLVED_CHANGES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resolved_changes_total"),
        "Total number of resolved changes by record type and location outcome",
    );
    let counter = CounterVec::new(opts, &["record_type", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of failed resolutions (no change produced)
///
/// Labels:
/// - `record_type`: `A`, `AAAA`
pub static RESOLUTION_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resolution_failures_total"),
        "Total number of resolutions that produced no change",
    );
    let counter = CounterVec::new(opts, &["record_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Provider Metrics
// ============================================================================

/// Total number of change batches submitted
///
/// Labels:
/// - `action`: `upsert`, `delete`
/// - `status`: `applied`, `failed`
pub static BATCHES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_batches_total"),
        "Total number of change batches by action and status",
    );
    let counter = CounterVec::new(opts, &["action", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of provider API calls, including retries
///
/// Labels:
/// - `operation`: `list`, `change`
/// - `status`: `success`, `error`
pub static PROVIDER_CALLS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_calls_total"),
        "Total number of provider API calls by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Time spent waiting for the provider rate limit, in seconds
pub static RATE_LIMIT_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_rate_limit_wait_seconds"),
        "Time spent waiting for a provider rate-limit slot",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Record a finished pass
///
/// # Arguments
/// * `kind` - `sync` or `cleanup`
/// * `status` - `completed`, `superseded` or `failed`
/// * `duration` - Wall-clock duration of the pass
pub fn record_pass(kind: &str, status: &str, duration: Duration) {
    PASSES_TOTAL.with_label_values(&[kind, status]).inc();
    PASS_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// Record a resolved change and its location outcome
pub fn record_resolved_change(record_type: &str, outcome: &str) {
    RESOLVED_CHANGES_TOTAL
        .with_label_values(&[record_type, outcome])
        .inc();
}

/// Record a resolution that produced no change
pub fn record_resolution_failure(record_type: &str) {
    RESOLUTION_FAILURES_TOTAL
        .with_label_values(&[record_type])
        .inc();
}

/// Record a submitted batch
pub fn record_batch(action: &str, applied: bool) {
    let status = if applied { "applied" } else { "failed" };
    BATCHES_TOTAL.with_label_values(&[action, status]).inc();
}

/// Record a single provider API call
pub fn record_provider_call(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    PROVIDER_CALLS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record time spent waiting for the rate limiter
pub fn record_rate_limit_wait(waited: Duration) {
    RATE_LIMIT_WAIT_SECONDS.observe(waited.as_secs_f64());
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("# Failed to encode metrics: {e}\n"),
            )
        }
    }
}

/// Router exposing the registry at [`METRICS_SERVER_PATH`].
pub fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics_handler))
}

/// Serve the metrics endpoint until the task is dropped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, path = METRICS_SERVER_PATH, "Serving metrics");
    axum::serve(listener, metrics_router()).await?;
    Ok(())
}
