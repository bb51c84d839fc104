// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `changes.rs`

#[cfg(test)]
mod tests {
    use super::super::{ChangeResolver, ChangeResolverConfig, LocationOutcome};
    use crate::reconcilers::retry::ExponentialBackoff;
    use crate::dns_errors::{LocationError, ResolveError};
    use crate::inventory::Pop;
    use crate::location::LocationValidator;
    use crate::records::{ChangeAction, RecordType};
    use crate::resolver::AddressResolver;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Fails `failures` times, then returns `addresses`.
    struct FlakyResolver {
        failures: u32,
        calls: AtomicU32,
        addresses: Vec<String>,
    }

    #[async_trait]
    impl AddressResolver for FlakyResolver {
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
            Ok(self.addresses.clone())
        }
    }

    /// Returns queued observations, then repeats the last one.
    struct ScriptedValidator {
        observations: Mutex<VecDeque<Result<String, LocationError>>>,
        last: Mutex<Result<String, LocationError>>,
        calls: AtomicU32,
        ipv4_only: bool,
    }

    impl ScriptedValidator {
        fn new(script: Vec<Result<String, LocationError>>) -> Self {
            let last = script
                .last()
                .cloned()
                .unwrap_or_else(|| Ok(String::new()));
            Self {
                observations: Mutex::new(script.into()),
                last: Mutex::new(last),
                calls: AtomicU32::new(0),
                ipv4_only: false,
            }
        }

        fn always(observed: &str) -> Self {
            Self::new(vec![Ok(observed.to_string())])
        }
    }

    #[async_trait]
    impl LocationValidator for ScriptedValidator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn applies_to(&self, record_type: &RecordType) -> bool {
            !self.ipv4_only || *record_type == RecordType::A
        }

        async fn observe(&self, _hostname: &str, _address: &str) -> Result<String, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.observations.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => self.last.lock().unwrap().clone(),
            }
        }
    }

    fn resolver(failures: u32) -> Arc<FlakyResolver> {
        Arc::new(FlakyResolver {
            failures,
            calls: AtomicU32::new(0),
            addresses: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        })
    }

    fn config() -> ChangeResolverConfig {
        ChangeResolverConfig {
            resolve_attempts: 3,
            resolve_backoff: ExponentialBackoff::fixed(Duration::from_millis(1)),
            location_attempts: 5,
            accept_neighbors: true,
        }
    }

    fn nyc() -> Pop {
        Pop::new("NYC", "1.2.3.0/24").with_neighbors(["ewr"])
    }

    #[tokio::test]
    async fn test_matching_location_emits_upsert() {
        let validator = Arc::new(ScriptedValidator::always("NYC50-C1"));
        let changes = ChangeResolver::new(resolver(0), Some(validator.clone()), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.change.action, ChangeAction::Upsert);
        assert_eq!(resolved.change.record_set.name, "nyc.cdn.example.com");
        assert_eq!(resolved.change.record_set.ttl, Some(60));
        assert_eq!(
            resolved.change.record_set.records,
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert_eq!(
            resolved.outcome,
            LocationOutcome::Matched {
                observed: "NYC50-C1".to_string()
            }
        );
        assert_eq!(resolved.attempts, 1);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_always_mismatch_uses_full_outer_budget() {
        let resolver = resolver(0);
        let validator = Arc::new(ScriptedValidator::always("LAX1-C2"));
        let changes = ChangeResolver::new(resolver.clone(), Some(validator.clone()), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 5);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 5);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            resolved.outcome,
            LocationOutcome::Mismatch {
                observed: "LAX1-C2".to_string()
            }
        );
        assert_eq!(resolved.change.record_set.records.len(), 2);
    }

    #[tokio::test]
    async fn test_mismatch_then_match_stops_early() {
        let validator = Arc::new(ScriptedValidator::new(vec![
            Ok("LAX1".to_string()),
            Ok("lax1".to_string()),
            Ok("nyc50".to_string()),
        ]));
        let changes = ChangeResolver::new(resolver(0), Some(validator), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 3);
        assert!(resolved.outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_transient_resolver_failures_stay_in_inner_budget() {
        let resolver = resolver(2);
        let validator = Arc::new(ScriptedValidator::always("nyc50"));
        let changes = ChangeResolver::new(resolver.clone(), Some(validator), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 1, "No outer retry should be used");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resolver_failure_surfaces_after_inner_budget() {
        let resolver = resolver(10);
        let changes = ChangeResolver::new(resolver.clone(), None, config());

        let result = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::Aaaa)
            .await;

        assert!(matches!(result, Err(ResolveError::NoAddressFound { .. })));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_neighbor_is_accepted() {
        let validator = Arc::new(ScriptedValidator::always("EWR53-P2"));
        let changes = ChangeResolver::new(resolver(0), Some(validator), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 1);
        assert_eq!(
            resolved.outcome,
            LocationOutcome::Neighbor {
                observed: "EWR53-P2".to_string(),
                neighbor: "ewr".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_neighbor_rejected_when_disabled() {
        let validator = Arc::new(ScriptedValidator::always("EWR53-P2"));
        let mut config = config();
        config.accept_neighbors = false;
        config.location_attempts = 2;
        let changes = ChangeResolver::new(resolver(0), Some(validator), config);

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 2);
        assert_eq!(resolved.outcome.label(), "mismatch");
    }

    #[tokio::test]
    async fn test_validator_error_counts_as_mismatch() {
        let validator = Arc::new(ScriptedValidator::new(vec![
            Err(LocationError::NoReverseHostname {
                address: "10.0.0.1".to_string(),
            }),
            Ok("nyc50".to_string()),
        ]));
        let changes = ChangeResolver::new(resolver(0), Some(validator), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::A)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 2);
        assert_eq!(resolved.outcome.label(), "matched");
    }

    #[tokio::test]
    async fn test_validator_skipped_for_unsupported_type() {
        let mut validator = ScriptedValidator::always("LAX1");
        validator.ipv4_only = true;
        let validator = Arc::new(validator);
        let changes = ChangeResolver::new(resolver(0), Some(validator.clone()), config());

        let resolved = changes
            .resolve_change("cdn.example.com", &nyc(), RecordType::Aaaa)
            .await
            .unwrap();

        assert_eq!(resolved.outcome, LocationOutcome::NotValidated);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.change.record_set.record_type, RecordType::Aaaa);
    }
}
