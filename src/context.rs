// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared runtime context built from validated [`Settings`].
//!
//! The context owns the long-lived pieces every command needs:
//! - the subnet-scoped address resolver and optional location validator
//! - the change resolver built on top of them
//! - the PoP inventory source
//! - for provider-backed commands, the rate-limited apply client and the
//!   [`Reconciler`]

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::{Settings, ValidationStrategy};
use crate::inventory::{FilePopSource, PopSource};
use crate::location::{LocationValidator, ProbeHeaderValidator, ReverseDnsValidator};
use crate::provider::http::HttpProvider;
use crate::provider::DnsProvider;
use crate::reconcilers::apply::ApplyClient;
use crate::reconcilers::changes::{ChangeResolver, ChangeResolverConfig};
use crate::reconcilers::orchestrator::Reconciler;
use crate::reconcilers::rate_limit::RateLimiter;
use crate::records::RecordType;
use crate::resolver::{AddressResolver, EcsResolver};

/// Shared context passed to every command.
#[derive(Clone)]
pub struct Context {
    pub settings: Settings,

    /// Resolves and validates PoP hostnames
    pub changes: ChangeResolver,

    /// Inventory re-read at the start of every pass
    pub source: Arc<dyn PopSource>,

    /// Present only when the provider settings were required and given
    pub reconciler: Option<Arc<Reconciler>>,
}

impl Context {
    /// Build the resolution side only (no provider access).
    ///
    /// # Errors
    ///
    /// Returns an error if the location validator cannot be built.
    pub fn resolution_only(settings: Settings) -> Result<Self> {
        let changes = build_change_resolver(&settings)?;
        let source: Arc<dyn PopSource> = Arc::new(FilePopSource::new(settings.pop_file.clone()));

        Ok(Self {
            settings,
            changes,
            source,
            reconciler: None,
        })
    }

    /// Build the full context, including the HTTP provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider settings are missing or the HTTP
    /// clients cannot be built.
    pub fn with_provider(settings: Settings) -> Result<Self> {
        let endpoint = settings
            .provider_endpoint
            .clone()
            .context("PROVIDER_ENDPOINT is not defined")?;
        let provider = HttpProvider::new(&endpoint, settings.provider_token.clone())
            .context("Failed to build provider client")?;

        Self::with_dns_provider(settings, Arc::new(provider))
    }

    /// Build the full context around an existing provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone is not configured or the location
    /// validator cannot be built.
    pub fn with_dns_provider(settings: Settings, provider: Arc<dyn DnsProvider>) -> Result<Self> {
        let zone_id = settings
            .zone_id
            .clone()
            .context("HOST_ZONE_ID is not defined")?;

        let mut context = Self::resolution_only(settings)?;
        let apply = Arc::new(ApplyClient::new(
            provider,
            zone_id,
            RateLimiter::per_second(context.settings.rate_limit),
        ));
        context.reconciler = Some(Arc::new(Reconciler::new(
            context.changes.clone(),
            apply,
            context.settings.domains.clone(),
            RecordType::published(context.settings.skip_ipv6),
        )));
        debug!(
            domains = context.settings.domains.len(),
            rate_limit = context.settings.rate_limit,
            "Provider context initialized"
        );
        Ok(context)
    }

    /// The reconciler, or an error when the context was built without a provider.
    ///
    /// # Errors
    ///
    /// Returns an error for resolution-only contexts.
    pub fn reconciler(&self) -> Result<Arc<Reconciler>> {
        self.reconciler
            .clone()
            .context("Provider settings were not loaded for this command")
    }
}

/// Build the location validator selected by `settings`.
///
/// # Errors
///
/// Returns an error if the probe HTTP client cannot be built.
pub fn build_validator(settings: &Settings) -> Result<Option<Arc<dyn LocationValidator>>> {
    let validator: Option<Arc<dyn LocationValidator>> = match settings.validation {
        ValidationStrategy::ReverseDns => {
            Some(Arc::new(
                ReverseDnsValidator::new(settings.dns_resolver).with_timeout(settings.dns_timeout),
            ))
        }
        ValidationStrategy::ProbeHeader => Some(Arc::new(
            ProbeHeaderValidator::new(&settings.probe_header)
                .context("Failed to build probe HTTP client")?,
        )),
        ValidationStrategy::None => None,
    };
    debug!(strategy = ?settings.validation, "Location validation configured");
    Ok(validator)
}

fn build_change_resolver(settings: &Settings) -> Result<ChangeResolver> {
    let resolver: Arc<dyn AddressResolver> =
        Arc::new(EcsResolver::new(settings.dns_resolver).with_timeout(settings.dns_timeout));
    let config = ChangeResolverConfig {
        accept_neighbors: settings.accept_neighbors,
        ..ChangeResolverConfig::default()
    };
    Ok(ChangeResolver::new(
        resolver,
        build_validator(settings)?,
        config,
    ))
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
