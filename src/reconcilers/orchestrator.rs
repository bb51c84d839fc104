// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation passes.
//!
//! A sync pass fans out one change resolution per (domain, PoP, record type),
//! waits for all of them to settle, batches the resulting UPSERTs and applies
//! the batches one after another. A cleanup pass lists the zone and deletes
//! every record set named `<code>.<domain>`.
//!
//! In recurring mode each pass receives a [`RunToken`]. Starting a new pass
//! supersedes the previous token; a superseded pass stops at its next
//! checkpoint (before each PoP's fan-out, after fan-in, before each batch).
//! Resolutions already in flight are allowed to finish and their results are
//! dropped.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dns_errors::{ProviderError, ResolveError};
use crate::inventory::{Pop, PopSource};
use crate::metrics;
use crate::records::{normalize_name, pop_hostname, Change, ChangeAction, RecordType};
use crate::reconcilers::apply::ApplyClient;
use crate::reconcilers::batcher::{batch_changes, BatchLimits};
use crate::reconcilers::changes::{ChangeResolver, LocationOutcome, ResolvedChange};
use crate::reconcilers::pagination::list_all_record_sets;

// ============================================================================
// Run tokens
// ============================================================================

/// Issues run tokens; issuing a new token supersedes every older one.
#[derive(Debug, Clone, Default)]
pub struct RunTokens {
    generation: Arc<AtomicU64>,
}

impl RunTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its token.
    pub fn issue(&self) -> RunToken {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RunToken {
            id,
            generation: Arc::clone(&self.generation),
        }
    }

    /// Current generation number.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Identity of one pass, checked at cancellation points.
#[derive(Debug, Clone)]
pub struct RunToken {
    id: u64,
    generation: Arc<AtomicU64>,
}

impl RunToken {
    /// A token that is never superseded (one-shot mode).
    #[must_use]
    pub fn standalone() -> Self {
        RunTokens::new().issue()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a newer pass has started since this token was issued.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.id
    }
}

// ============================================================================
// Pass summaries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Completed,
    Superseded,
}

impl PassStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Superseded => "superseded",
        }
    }
}

/// Diagnostics for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub run_id: u64,
    pub kind: &'static str,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: PassStatus,
    /// Changes produced by resolution (sync) or by the name filter (cleanup)
    pub changes: usize,
    pub resolution_failures: usize,
    pub mismatches: usize,
    pub duplicates: usize,
    pub batches_applied: usize,
    pub batches_failed: usize,
}

impl PassSummary {
    fn start(kind: &'static str, token: &RunToken) -> (Self, Instant) {
        (
            Self {
                run_id: token.id(),
                kind,
                started_at: Utc::now(),
                duration_ms: 0,
                status: PassStatus::Completed,
                changes: 0,
                resolution_failures: 0,
                mismatches: 0,
                duplicates: 0,
                batches_applied: 0,
                batches_failed: 0,
            },
            Instant::now(),
        )
    }

    fn finish(mut self, status: PassStatus, started: Instant) -> Self {
        let elapsed = started.elapsed();
        self.status = status;
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        metrics::record_pass(self.kind, status.as_str(), elapsed);
        info!(
            run_id = self.run_id,
            kind = self.kind,
            started_at = %self.started_at.to_rfc3339(),
            status = status.as_str(),
            duration_ms = self.duration_ms,
            changes = self.changes,
            resolution_failures = self.resolution_failures,
            mismatches = self.mismatches,
            batches_applied = self.batches_applied,
            batches_failed = self.batches_failed,
            "Pass finished"
        );
        self
    }
}

// ============================================================================
// Endpoint check reports
// ============================================================================

/// Result of checking one PoP's published endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Neighbor { observed: String, neighbor: String },
    Unexpected { observed: String },
    NotValidated,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub code: String,
    pub hostname: String,
    pub addresses: Vec<String>,
    #[serde(flatten)]
    pub status: CheckStatus,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Runs sync, cleanup and check passes for a set of domains.
pub struct Reconciler {
    changes: ChangeResolver,
    apply: Arc<ApplyClient>,
    domains: Vec<String>,
    record_types: Vec<RecordType>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        changes: ChangeResolver,
        apply: Arc<ApplyClient>,
        domains: Vec<String>,
        record_types: Vec<RecordType>,
    ) -> Self {
        Self {
            changes,
            apply,
            domains,
            record_types,
        }
    }

    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Every hostname this reconciler publishes for `pops`, normalized.
    #[must_use]
    pub fn managed_hostnames(&self, pops: &[Pop]) -> HashSet<String> {
        pops.iter()
            .flat_map(|pop| {
                self.domains
                    .iter()
                    .map(|domain| normalize_name(&pop_hostname(&pop.code, domain)))
            })
            .collect()
    }

    /// Resolve every (domain, PoP, record type) and publish the UPSERTs.
    pub async fn sync_pass(&self, pops: &[Pop], token: &RunToken) -> PassSummary {
        let (mut summary, started) = PassSummary::start("sync", token);
        info!(
            run_id = token.id(),
            domains = self.domains.len(),
            pops = pops.len(),
            record_types = self.record_types.len(),
            "Starting sync pass"
        );

        let mut tasks = FuturesUnordered::new();
        let mut superseded = false;
        'fan_out: for pop in pops {
            if token.is_superseded() {
                superseded = true;
                break 'fan_out;
            }
            for domain in &self.domains {
                for record_type in &self.record_types {
                    tasks.push(self.resolve_task(domain, pop, record_type.clone()));
                }
            }
        }

        // Fan-in: wait for everything launched to settle
        let mut resolved = Vec::with_capacity(tasks.len());
        while let Some(outcome) = tasks.next().await {
            match outcome {
                (_, Ok(change)) => resolved.push(change),
                (label, Err(e)) => {
                    summary.resolution_failures += 1;
                    error!(change = %label, error = %e, "Change resolution failed");
                }
            }
        }

        if superseded || token.is_superseded() {
            warn!(
                run_id = token.id(),
                discarded = resolved.len(),
                "Pass superseded during resolution, discarding results"
            );
            return summary.finish(PassStatus::Superseded, started);
        }

        summary.mismatches = resolved
            .iter()
            .filter(|r| matches!(r.outcome, LocationOutcome::Mismatch { .. }))
            .count();
        let (changes, duplicates) = dedupe(resolved.into_iter().map(|r| r.change));
        summary.duplicates = duplicates;
        summary.changes = changes.len();

        let status = self
            .apply_changes(changes, &BatchLimits::for_upserts(), token, &mut summary)
            .await;
        summary.finish(status, started)
    }

    fn resolve_task<'a>(
        &'a self,
        domain: &'a str,
        pop: &'a Pop,
        record_type: RecordType,
    ) -> impl Future<Output = (String, Result<ResolvedChange, ResolveError>)> + 'a {
        async move {
            let label = format!("{record_type} {}", pop_hostname(&pop.code, domain));
            let result = self.changes.resolve_change(domain, pop, record_type.clone()).await;
            match &result {
                Ok(resolved) => {
                    metrics::record_resolved_change(record_type.as_str(), resolved.outcome.label());
                }
                Err(_) => metrics::record_resolution_failure(record_type.as_str()),
            }
            (label, result)
        }
    }

    /// Delete every record set named `<code>.<domain>` for `pops`.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone listing fails; batch failures are logged
    /// and counted instead.
    pub async fn cleanup_pass(
        &self,
        pops: &[Pop],
        token: &RunToken,
    ) -> Result<PassSummary, ProviderError> {
        let (mut summary, started) = PassSummary::start("cleanup", token);
        let managed = self.managed_hostnames(pops);
        info!(
            run_id = token.id(),
            zone_id = %self.apply.zone_id(),
            managed_hostnames = managed.len(),
            "Starting cleanup pass"
        );

        let record_sets = list_all_record_sets(&self.apply).await?;
        let total = record_sets.len();

        let deletes: Vec<Change> = record_sets
            .into_iter()
            .filter(|set| managed.contains(&normalize_name(&set.name)))
            .filter(|set| {
                if set.records.is_empty() {
                    debug!(name = %set.name, "Skipping record set without records");
                    false
                } else {
                    true
                }
            })
            .map(Change::delete)
            .collect();

        info!(
            listed = total,
            to_delete = deletes.len(),
            "Filtered managed record sets"
        );
        summary.changes = deletes.len();

        let status = self
            .apply_changes(deletes, &BatchLimits::for_deletes(), token, &mut summary)
            .await;
        Ok(summary.finish(status, started))
    }

    /// Batch `changes` and apply the batches in order.
    ///
    /// A failed batch is logged and skipped. Returns `Superseded` if the token
    /// was superseded before a batch.
    async fn apply_changes(
        &self,
        changes: Vec<Change>,
        limits: &BatchLimits,
        token: &RunToken,
        summary: &mut PassSummary,
    ) -> PassStatus {
        let action = match changes.first().map(|c| c.action) {
            Some(ChangeAction::Delete) => "delete",
            _ => "upsert",
        };
        let batches = batch_changes(changes, limits);
        let batch_count = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            if token.is_superseded() {
                warn!(
                    run_id = token.id(),
                    applied = summary.batches_applied,
                    remaining = batch_count - index,
                    "Pass superseded, skipping remaining batches"
                );
                return PassStatus::Superseded;
            }

            match self.apply.apply(batch).await {
                Ok(()) => {
                    summary.batches_applied += 1;
                    metrics::record_batch(action, true);
                    info!(
                        batch = index + 1,
                        of = batch_count,
                        changes = batch.len(),
                        "Applied batch"
                    );
                }
                Err(e) => {
                    summary.batches_failed += 1;
                    metrics::record_batch(action, false);
                    error!(
                        batch = index + 1,
                        of = batch_count,
                        changes = batch.len(),
                        error = %e,
                        "Batch failed, continuing with next batch"
                    );
                }
            }
        }
        PassStatus::Completed
    }

    /// Load the inventory and run one sync pass, logging instead of failing.
    pub async fn run_pass(&self, source: &dyn PopSource, token: &RunToken) -> Option<PassSummary> {
        let started = Instant::now();
        let pops = match source.load().await {
            Ok(pops) => pops,
            Err(e) => {
                error!(run_id = token.id(), error = %e, "Failed to load PoP inventory");
                metrics::record_pass("sync", "failed", started.elapsed());
                return None;
            }
        };
        Some(self.sync_pass(&pops, token).await)
    }

    /// Start a sync pass every `interval` until `shutdown` resolves.
    ///
    /// Each pass runs on its own task and supersedes the previous one. Pass
    /// failures are logged and never end the loop.
    pub async fn run_recurring<F>(
        self: Arc<Self>,
        source: Arc<dyn PopSource>,
        interval: Duration,
        shutdown: F,
    ) -> RunTokens
    where
        F: Future<Output = ()>,
    {
        let tokens = RunTokens::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = JoinSet::new();
        tokio::pin!(shutdown);

        info!(interval = ?interval, "Starting recurring sync");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping recurring sync");
                    break;
                }
                _ = ticker.tick() => {
                    let token = tokens.issue();
                    let reconciler = Arc::clone(&self);
                    let source = Arc::clone(&source);
                    debug!(run_id = token.id(), "Starting scheduled pass");
                    passes.spawn(async move { reconciler.run_pass(source.as_ref(), &token).await });
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Pass task failed");
                    }
                }
            }
        }

        // Supersede whatever is still running and let it stop at its next checkpoint
        tokens.issue();
        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Pass task failed");
            }
        }
        tokens
    }
}

/// Resolve and validate each PoP's published hostname under `domain`.
///
/// Nothing is written to the provider. Reports are returned in `pops`
/// order.
pub async fn check_endpoints(
    changes: &ChangeResolver,
    domain: &str,
    pops: &[Pop],
) -> Vec<CheckReport> {
    let checks = pops.iter().map(|pop| async move {
        let hostname = pop_hostname(&pop.code, domain);
        match changes.observe(&hostname, pop, &RecordType::A).await {
            Ok(observation) => CheckReport {
                code: pop.code.clone(),
                hostname,
                addresses: observation.addresses,
                status: match observation.outcome {
                    LocationOutcome::Matched { .. } => CheckStatus::Ok,
                    LocationOutcome::Neighbor { observed, neighbor } => {
                        CheckStatus::Neighbor { observed, neighbor }
                    }
                    LocationOutcome::Mismatch { observed } => {
                        CheckStatus::Unexpected { observed }
                    }
                    LocationOutcome::NotValidated => CheckStatus::NotValidated,
                },
            },
            Err(e) => CheckReport {
                code: pop.code.clone(),
                hostname,
                addresses: Vec::new(),
                status: CheckStatus::Failed {
                    reason: e.to_string(),
                },
            },
        }
    });
    futures::future::join_all(checks).await
}

/// Drop repeated (name, type) changes, keeping the first.
fn dedupe(changes: impl Iterator<Item = Change>) -> (Vec<Change>, usize) {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let unique = changes
        .filter(|change| {
            let key = (
                normalize_name(&change.record_set.name),
                change.record_set.record_type.clone(),
            );
            if seen.insert(key) {
                true
            } else {
                duplicates += 1;
                warn!(
                    name = %change.record_set.name,
                    record_type = %change.record_set.record_type,
                    "Duplicate change dropped"
                );
                false
            }
        })
        .collect();
    (unique, duplicates)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
