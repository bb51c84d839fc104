// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change batching.
//!
//! Packs change descriptors into provider-sized batches in a single greedy
//! pass. A batch is closed as soon as the next change would push the change
//! count, the record count or the record value length over its limit.
//! Change order is preserved across the resulting batches.

use crate::constants::{
    DELETE_MAX_CHANGES, DELETE_MAX_RECORDS, DELETE_MAX_VALUE_CHARS, UPSERT_MAX_CHANGES,
    UPSERT_MAX_RECORDS, UPSERT_MAX_VALUE_CHARS,
};
use crate::records::{Change, ChangeBatch};

/// Per-batch size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_changes: usize,
    pub max_records: usize,
    pub max_value_chars: usize,
}

impl BatchLimits {
    /// Limits for UPSERT batches.
    ///
    /// The provider counts an UPSERT twice against its per-request caps, so
    /// these are half the raw limits.
    #[must_use]
    pub const fn for_upserts() -> Self {
        Self {
            max_changes: UPSERT_MAX_CHANGES,
            max_records: UPSERT_MAX_RECORDS,
            max_value_chars: UPSERT_MAX_VALUE_CHARS,
        }
    }

    /// Limits for DELETE batches.
    #[must_use]
    pub const fn for_deletes() -> Self {
        Self {
            max_changes: DELETE_MAX_CHANGES,
            max_records: DELETE_MAX_RECORDS,
            max_value_chars: DELETE_MAX_VALUE_CHARS,
        }
    }
}

#[derive(Default)]
struct Totals {
    changes: usize,
    records: usize,
    value_chars: usize,
}

impl Totals {
    fn would_exceed(&self, change: &Change, limits: &BatchLimits) -> bool {
        self.changes + 1 > limits.max_changes
            || self.records + change.record_count() > limits.max_records
            || self.value_chars + change.value_chars() > limits.max_value_chars
    }

    fn add(&mut self, change: &Change) {
        self.changes += 1;
        self.records += change.record_count();
        self.value_chars += change.value_chars();
    }
}

/// Split `changes` into batches that respect `limits`.
///
/// Empty input yields no batches. A change that alone exceeds a limit is
/// placed in a batch of its own rather than dropped; the provider decides
/// whether to accept it.
#[must_use]
pub fn batch_changes(changes: Vec<Change>, limits: &BatchLimits) -> Vec<ChangeBatch> {
    let mut batches = Vec::new();
    let mut current = ChangeBatch::default();
    let mut totals = Totals::default();

    for change in changes {
        if !current.is_empty() && totals.would_exceed(&change, limits) {
            batches.push(std::mem::take(&mut current));
            totals = Totals::default();
        }
        totals.add(&change);
        current.changes.push(change);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod batcher_tests;
