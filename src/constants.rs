// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for popdns.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port for queries
pub const DNS_PORT: u16 = 53;

/// Default trusted recursive resolver used for subnet-scoped queries
pub const DEFAULT_DNS_RESOLVER: &str = "8.8.8.8:53";

/// EDNS UDP payload size advertised on outgoing queries
pub const EDNS_MAX_PAYLOAD: u16 = 1232;

/// Receive buffer for UDP responses (must hold `EDNS_MAX_PAYLOAD`)
pub const DNS_RECV_BUFFER_BYTES: usize = 4096;

/// Timeout for a single DNS query (5 seconds)
pub const DNS_QUERY_TIMEOUT_SECS: u64 = 5;

/// TTL for every published PoP record (1 minute)
pub const PUBLISHED_RECORD_TTL_SECS: u32 = 60;

/// Prefix of reverse hostnames assigned to CDN edge servers
pub const REVERSE_HOSTNAME_PREFIX: &str = "server-";

// ============================================================================
// Location Probe Constants
// ============================================================================

/// Response header carrying the serving PoP code
pub const DEFAULT_PROBE_HEADER: &str = "x-amz-cf-pop";

/// Timeout for a single HTTP HEAD probe (5 seconds)
pub const PROBE_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Change Resolution Constants
// ============================================================================

/// Attempts per address resolution before the error is surfaced
pub const RESOLVE_MAX_ATTEMPTS: u32 = 3;

/// Delay between address resolution attempts (200ms)
pub const RESOLVE_RETRY_DELAY_MILLIS: u64 = 200;

/// Resolve-and-validate attempts before publishing with a mismatch warning
pub const LOCATION_MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// Change Batch Limits
// ============================================================================

/// Maximum change descriptors per UPSERT batch
pub const UPSERT_MAX_CHANGES: usize = 500;

/// Maximum record values per UPSERT batch (UPSERT counts twice against 1000)
pub const UPSERT_MAX_RECORDS: usize = 500;

/// Maximum record value characters per UPSERT batch (half of 32000)
pub const UPSERT_MAX_VALUE_CHARS: usize = 16_000;

/// Maximum change descriptors per DELETE batch
pub const DELETE_MAX_CHANGES: usize = 1000;

/// Maximum record values per DELETE batch
pub const DELETE_MAX_RECORDS: usize = 1000;

/// Maximum record value characters per DELETE batch
pub const DELETE_MAX_VALUE_CHARS: usize = 32_000;

// ============================================================================
// Provider API Constants
// ============================================================================

/// Provider API calls allowed per rate-limit window
pub const PROVIDER_MAX_CALLS_PER_WINDOW: usize = 5;

/// Sliding rate-limit window (1 second)
pub const PROVIDER_RATE_WINDOW_MILLIS: u64 = 1000;

/// Attempts per provider call before the batch is given up
pub const PROVIDER_MAX_ATTEMPTS: u32 = 3;

/// Initial delay between provider call attempts (500ms)
pub const PROVIDER_RETRY_INITIAL_MILLIS: u64 = 500;

/// Timeout for a single provider HTTP request (30 seconds)
pub const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Scheduler Constants
// ============================================================================

/// Interval between recurring reconciliation passes (1 minute)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
