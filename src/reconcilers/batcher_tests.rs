// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `batcher.rs`

#[cfg(test)]
mod tests {
    use super::super::{batch_changes, BatchLimits};
    use crate::records::{Change, ChangeBatch, RecordType};

    fn upsert(i: usize, records: usize) -> Change {
        Change::upsert(
            format!("pop{i}.example.com"),
            RecordType::A,
            (0..records).map(|r| format!("10.0.{}.{}", i % 256, r % 256)).collect(),
        )
    }

    fn assert_within(batches: &[ChangeBatch], limits: &BatchLimits) {
        for batch in batches {
            // Single oversized change is allowed to stand alone
            if batch.len() == 1 {
                continue;
            }
            assert!(batch.len() <= limits.max_changes);
            assert!(batch.record_count() <= limits.max_records);
            assert!(batch.value_chars() <= limits.max_value_chars);
        }
    }

    fn flatten(batches: Vec<ChangeBatch>) -> Vec<Change> {
        batches.into_iter().flat_map(|b| b.changes).collect()
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert!(batch_changes(Vec::new(), &BatchLimits::for_upserts()).is_empty());
    }

    #[test]
    fn test_default_limits() {
        let upsert = BatchLimits::for_upserts();
        assert_eq!(
            (upsert.max_changes, upsert.max_records, upsert.max_value_chars),
            (500, 500, 16_000)
        );
        let delete = BatchLimits::for_deletes();
        assert_eq!(
            (delete.max_changes, delete.max_records, delete.max_value_chars),
            (1000, 1000, 32_000)
        );
    }

    #[test]
    fn test_change_count_limit() {
        let limits = BatchLimits {
            max_changes: 3,
            max_records: 1000,
            max_value_chars: 100_000,
        };
        let changes: Vec<Change> = (0..7).map(|i| upsert(i, 1)).collect();

        let batches = batch_changes(changes.clone(), &limits);

        let sizes: Vec<usize> = batches.iter().map(ChangeBatch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(flatten(batches), changes, "Order must be preserved");
    }

    #[test]
    fn test_record_count_limit() {
        let limits = BatchLimits {
            max_changes: 100,
            max_records: 5,
            max_value_chars: 100_000,
        };
        // 2 + 2 fit, third pushes to 6
        let changes: Vec<Change> = (0..5).map(|i| upsert(i, 2)).collect();

        let batches = batch_changes(changes.clone(), &limits);

        assert_within(&batches, &limits);
        let sizes: Vec<usize> = batches.iter().map(ChangeBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(flatten(batches), changes);
    }

    #[test]
    fn test_value_chars_limit() {
        let limits = BatchLimits {
            max_changes: 100,
            max_records: 100,
            max_value_chars: 20,
        };
        let changes = vec![
            Change::upsert("a.example.com".into(), RecordType::A, vec!["10.0.0.1".into()]),
            Change::upsert("b.example.com".into(), RecordType::A, vec!["10.0.0.2".into()]),
            Change::upsert("c.example.com".into(), RecordType::A, vec!["10.0.0.3".into()]),
        ];

        let batches = batch_changes(changes, &limits);

        // 8 + 8 = 16 fits, adding 8 more would be 24
        let sizes: Vec<usize> = batches.iter().map(ChangeBatch::len).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn test_oversized_change_gets_own_batch() {
        let limits = BatchLimits {
            max_changes: 10,
            max_records: 3,
            max_value_chars: 100_000,
        };
        let changes = vec![upsert(0, 1), upsert(1, 8), upsert(2, 1)];

        let batches = batch_changes(changes.clone(), &limits);

        let sizes: Vec<usize> = batches.iter().map(ChangeBatch::len).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
        assert_eq!(batches[1].record_count(), 8);
        assert_eq!(flatten(batches), changes);
    }

    #[test]
    fn test_large_input_respects_upsert_limits() {
        let limits = BatchLimits::for_upserts();
        let changes: Vec<Change> = (0..1234).map(|i| upsert(i, 1 + i % 3)).collect();

        let batches = batch_changes(changes.clone(), &limits);

        assert_within(&batches, &limits);
        assert!(batches.iter().all(|b| !b.is_empty()));
        assert_eq!(flatten(batches), changes);
    }
}
