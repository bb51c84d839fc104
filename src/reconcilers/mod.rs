// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of PoP hostnames against the hosted zone.
//!
//! # Reconciliation Architecture
//!
//! 1. **Resolve** - Query each `<code>.<domain>` from the PoP's subnet ([`changes`])
//! 2. **Validate** - Confirm the address is served by the PoP, retrying on mismatch
//! 3. **Batch** - Pack changes under the provider's per-request limits ([`batcher`])
//! 4. **Apply** - Submit batches sequentially through the rate limiter ([`apply`])
//!
//! # Available Passes
//!
//! - [`Reconciler::sync_pass`] - Publishes UPSERTs for every PoP, domain and record type
//! - [`Reconciler::cleanup_pass`] - Deletes every managed record set
//! - [`check_endpoints`] - Reports where each PoP hostname is served from
//! - [`Reconciler::run_recurring`] - Runs sync passes on an interval with supersession

pub mod apply;
pub mod batcher;
pub mod changes;
pub mod orchestrator;
pub mod pagination;
pub mod rate_limit;
pub mod retry;

pub use apply::ApplyClient;
pub use batcher::{batch_changes, BatchLimits};
pub use changes::{ChangeResolver, ChangeResolverConfig, LocationOutcome, ResolvedChange};
pub use orchestrator::{
    check_endpoints, CheckReport, CheckStatus, PassStatus, PassSummary, Reconciler, RunToken,
    RunTokens,
};
pub use pagination::list_all_record_sets;
pub use rate_limit::RateLimiter;
