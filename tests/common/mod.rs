// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use popdns::dns_errors::{LocationError, ProviderError, ResolveError};
use popdns::inventory::Pop;
use popdns::location::LocationValidator;
use popdns::provider::{DnsProvider, ListCursor, RecordPage};
use popdns::reconcilers::{
    ApplyClient, ChangeResolver, ChangeResolverConfig, RateLimiter, Reconciler, RunTokens,
};
use popdns::records::{ChangeBatch, RecordSet, RecordType};
use popdns::resolver::AddressResolver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Resolver answering `10.0.0.1` / `2001:db8::1` after `failures` errors.
#[derive(Default)]
pub struct FakeResolver {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl FakeResolver {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for FakeResolver {
    async fn resolve(
        &self,
        hostname: &str,
        record_type: &RecordType,
        subnet: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(ResolveError::NoAddressFound {
                hostname: hostname.to_string(),
                record_type: record_type.to_string(),
                subnet: subnet.to_string(),
            });
        }
        match record_type {
            RecordType::Aaaa => Ok(vec!["2001:db8::1".to_string()]),
            _ => Ok(vec!["10.0.0.1".to_string()]),
        }
    }
}

/// Validator reporting the same location for every address.
pub struct FakeValidator {
    pub location: String,
    pub calls: AtomicU32,
}

impl FakeValidator {
    pub fn always(location: &str) -> Self {
        Self {
            location: location.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationValidator for FakeValidator {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn observe(&self, _hostname: &str, _address: &str) -> Result<String, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.location.clone())
    }
}

/// In-memory provider serving a fixed zone listing and recording change batches.
#[derive(Default)]
pub struct MemoryProvider {
    pub zone: Vec<RecordSet>,
    pub page_size: usize,
    pub batches: Mutex<Vec<ChangeBatch>>,
    pub list_calls: AtomicU32,
    /// Issued a new token on the first change call
    pub supersede_on_apply: Option<RunTokens>,
    /// Answer HTTP 500 to every submission of the first batch seen
    pub fail_first_batch: bool,
    pub change_calls: AtomicU32,
    pub failing_batch: Mutex<Option<ChangeBatch>>,
}

impl MemoryProvider {
    pub fn with_zone(zone: Vec<RecordSet>, page_size: usize) -> Self {
        Self {
            zone,
            page_size,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<ChangeBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    async fn list_records(
        &self,
        _zone_id: &str,
        cursor: Option<&ListCursor>,
    ) -> Result<RecordPage, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let start: usize = cursor
            .map(|c| c.start_name.parse().unwrap())
            .unwrap_or(0);
        let page_size = self.page_size.max(1);
        let end = (start + page_size).min(self.zone.len());
        let next = (end < self.zone.len()).then(|| ListCursor {
            start_name: end.to_string(),
            ..ListCursor::default()
        });
        Ok(RecordPage {
            record_sets: Some(self.zone[start..end].to_vec()),
            next,
        })
    }

    async fn change_records(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<(), ProviderError> {
        self.change_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first_batch {
            let mut failing = self.failing_batch.lock().unwrap();
            if *failing.get_or_insert_with(|| batch.clone()) == *batch {
                return Err(ProviderError::Server {
                    operation: "ChangeRecords".to_string(),
                    zone_id: zone_id.to_string(),
                    status_code: 500,
                    reason: "internal error".to_string(),
                });
            }
        }

        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            if let Some(tokens) = &self.supersede_on_apply {
                tokens.issue();
            }
        }
        batches.push(batch.clone());
        Ok(())
    }
}

/// Build a reconciler over fakes with default retry budgets.
pub fn reconciler(
    resolver: Arc<FakeResolver>,
    validator: Option<Arc<FakeValidator>>,
    provider: Arc<MemoryProvider>,
    domains: &[&str],
    skip_ipv6: bool,
) -> Reconciler {
    let validator = validator.map(|v| v as Arc<dyn LocationValidator>);
    let changes = ChangeResolver::new(resolver, validator, ChangeResolverConfig::default());
    let apply = Arc::new(ApplyClient::new(provider, "Z1", RateLimiter::per_second(5)));
    Reconciler::new(
        changes,
        apply,
        domains.iter().map(ToString::to_string).collect(),
        RecordType::published(skip_ipv6),
    )
}

/// `count` PoPs with codes `p000`, `p001`, ...
pub fn pops(count: usize) -> Vec<Pop> {
    (0..count)
        .map(|i| Pop::new(&format!("p{i:03}"), &format!("10.{}.{}.0/24", i / 256, i % 256)))
        .collect()
}

/// Record set as the provider would list it.
pub fn record_set(name: &str, record_type: RecordType, records: &[&str]) -> RecordSet {
    RecordSet {
        name: name.to_string(),
        record_type,
        ttl: Some(60),
        records: records.iter().map(ToString::to_string).collect(),
    }
}

/// Names in all recorded batches, in submission order.
pub fn submitted_names(batches: &[ChangeBatch]) -> Vec<String> {
    batches
        .iter()
        .flat_map(|b| b.changes.iter().map(|c| c.record_set.name.clone()))
        .collect()
}

/// Count of changes per record type across batches.
pub fn changes_by_type(batches: &[ChangeBatch]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for change in batches.iter().flat_map(|b| b.changes.iter()) {
        *counts
            .entry(change.record_set.record_type.to_string())
            .or_insert(0) += 1;
    }
    counts
}
