// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change resolution: resolve, validate, emit one UPSERT.
//!
//! For a (domain, PoP, record type) triple the domain is resolved as seen
//! from the PoP's subnet and the first returned address is checked against
//! the PoP's location. Two retry budgets apply:
//!
//! - an inner budget around each address resolution (transient resolver
//!   failures), after which the error is surfaced
//! - an outer budget of resolve-and-validate attempts while the location
//!   does not match, after which the change is emitted anyway with a warning
//!
//! The published name is `<code>.<domain>` and always carries the last
//! resolved addresses.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::{LOCATION_MAX_ATTEMPTS, RESOLVE_MAX_ATTEMPTS};
use crate::dns_errors::ResolveError;
use crate::inventory::Pop;
use crate::location::{match_location, LocationMatch, LocationValidator};
use crate::records::{pop_hostname, Change, RecordType};
use crate::reconcilers::retry::{resolve_backoff, retry_with_attempts, ExponentialBackoff};
use crate::resolver::AddressResolver;

/// Retry budgets and match policy for change resolution.
#[derive(Debug, Clone)]
pub struct ChangeResolverConfig {
    /// Attempts per address resolution
    pub resolve_attempts: u32,
    /// Schedule between address resolution attempts
    pub resolve_backoff: ExponentialBackoff,
    /// Resolve-and-validate attempts before giving up on the location
    pub location_attempts: u32,
    /// Accept a PoP's neighbors as a valid serving location
    pub accept_neighbors: bool,
}

impl Default for ChangeResolverConfig {
    fn default() -> Self {
        Self {
            resolve_attempts: RESOLVE_MAX_ATTEMPTS,
            resolve_backoff: resolve_backoff(),
            location_attempts: LOCATION_MAX_ATTEMPTS,
            accept_neighbors: true,
        }
    }
}

/// How the location of a resolved address compared with the PoP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationOutcome {
    /// Served by the expected PoP
    Matched { observed: String },
    /// Served by an accepted neighbor PoP
    Neighbor { observed: String, neighbor: String },
    /// Served elsewhere; published anyway after the retry budget ran out
    Mismatch { observed: String },
    /// No validation was performed for this record type
    NotValidated,
}

impl LocationOutcome {
    /// Short label used for metrics and reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::Neighbor { .. } => "neighbor",
            Self::Mismatch { .. } => "mismatch",
            Self::NotValidated => "not_validated",
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }
}

/// An UPSERT ready for batching, with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChange {
    pub change: Change,
    pub outcome: LocationOutcome,
    /// Resolve-and-validate attempts used
    pub attempts: u32,
}

/// Result of a single resolve-and-validate attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub addresses: Vec<String>,
    pub outcome: LocationOutcome,
}

/// Produces UPSERT changes for PoP hostnames.
#[derive(Clone)]
pub struct ChangeResolver {
    resolver: Arc<dyn AddressResolver>,
    validator: Option<Arc<dyn LocationValidator>>,
    config: ChangeResolverConfig,
}

impl ChangeResolver {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        validator: Option<Arc<dyn LocationValidator>>,
        config: ChangeResolverConfig,
    ) -> Self {
        Self {
            resolver,
            validator,
            config,
        }
    }

    /// Resolve `domain` from `pop`'s subnet and validate the first address once.
    ///
    /// # Errors
    ///
    /// Returns the resolver error once the inner retry budget is exhausted.
    pub async fn observe(
        &self,
        domain: &str,
        pop: &Pop,
        record_type: &RecordType,
    ) -> Result<Observation, ResolveError> {
        let operation = format!("resolve {record_type} {domain} for {}", pop.code);
        let addresses = retry_with_attempts(
            self.config.resolve_attempts,
            self.config.resolve_backoff.clone(),
            &operation,
            |_e: &ResolveError| true,
            || self.resolver.resolve(domain, record_type, &pop.subnet),
        )
        .await?;

        let outcome = match &self.validator {
            Some(validator) if validator.applies_to(record_type) => {
                self.validate(validator.as_ref(), domain, pop, &addresses)
                    .await
            }
            _ => LocationOutcome::NotValidated,
        };

        Ok(Observation { addresses, outcome })
    }

    async fn validate(
        &self,
        validator: &dyn LocationValidator,
        domain: &str,
        pop: &Pop,
        addresses: &[String],
    ) -> LocationOutcome {
        let Some(address) = addresses.first() else {
            return LocationOutcome::Mismatch {
                observed: String::new(),
            };
        };

        let observed = match validator.observe(domain, address).await {
            Ok(observed) => observed,
            Err(e) => {
                debug!(
                    strategy = validator.name(),
                    domain = %domain,
                    address = %address,
                    error = %e,
                    "Location lookup failed, treating as mismatch"
                );
                String::new()
            }
        };

        match match_location(
            &observed,
            &pop.code,
            &pop.neighbors,
            self.config.accept_neighbors,
        ) {
            LocationMatch::Direct => LocationOutcome::Matched { observed },
            LocationMatch::Neighbor(neighbor) => LocationOutcome::Neighbor { observed, neighbor },
            LocationMatch::Mismatch => LocationOutcome::Mismatch { observed },
        }
    }

    /// Build the UPSERT for `<code>.<domain>`.
    ///
    /// Location mismatches are retried up to the outer budget; when it runs
    /// out the change is still returned, carrying the last addresses and a
    /// `Mismatch` outcome.
    ///
    /// # Errors
    ///
    /// Returns the resolver error if address resolution fails on every inner
    /// attempt of any outer attempt.
    pub async fn resolve_change(
        &self,
        domain: &str,
        pop: &Pop,
        record_type: RecordType,
    ) -> Result<ResolvedChange, ResolveError> {
        let name = pop_hostname(&pop.code, domain);
        let max_attempts = self.config.location_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let observation = self.observe(domain, pop, &record_type).await?;

            match &observation.outcome {
                LocationOutcome::Mismatch { observed } if attempt < max_attempts => {
                    debug!(
                        name = %name,
                        record_type = %record_type,
                        attempt = attempt,
                        observed = %observed,
                        "Location mismatch, resolving again"
                    );
                    continue;
                }
                LocationOutcome::Mismatch { observed } => {
                    warn!(
                        name = %name,
                        record_type = %record_type,
                        pop = %pop.code,
                        attempts = attempt,
                        observed = %observed,
                        addresses = ?observation.addresses,
                        "Location mismatch after all attempts, publishing last addresses"
                    );
                }
                LocationOutcome::Neighbor { observed, neighbor } => {
                    info!(
                        name = %name,
                        record_type = %record_type,
                        observed = %observed,
                        neighbor = %neighbor,
                        "Address served by neighbor PoP"
                    );
                }
                LocationOutcome::Matched { .. } | LocationOutcome::NotValidated => {}
            }

            return Ok(ResolvedChange {
                change: Change::upsert(name, record_type, observation.addresses),
                outcome: observation.outcome,
                attempts: attempt,
            });
        }
    }
}

#[cfg(test)]
#[path = "changes_tests.rs"]
mod changes_tests;
