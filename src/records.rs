// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record set and change descriptor types.
//!
//! These are the values that flow from the change resolver through the
//! batcher into the provider API. They serialize to the provider's JSON
//! wire format:
//!
//! ```json
//! {"action": "UPSERT", "record_set": {"name": "nyc.example.com", "type": "A", "ttl": 60, "records": ["10.0.0.1"]}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::PUBLISHED_RECORD_TTL_SECS;

/// DNS record type of a record set.
///
/// Only A and AAAA are ever published; anything else seen while listing a
/// zone is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    A,
    Aaaa,
    Other(String),
}

impl RecordType {
    /// Wire name of the type (`A`, `AAAA`, ...).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Other(name) => name,
        }
    }

    /// Record types published for every PoP, honoring `skip_ipv6`.
    #[must_use]
    pub fn published(skip_ipv6: bool) -> Vec<Self> {
        if skip_ipv6 {
            vec![Self::A]
        } else {
            vec![Self::A, Self::Aaaa]
        }
    }
}

impl From<String> for RecordType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            _ => Self::Other(value),
        }
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named set of records of one type, as stored by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub records: Vec<String>,
}

/// What a change does to its record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Upsert,
    Delete,
}

/// One record-change unit submitted to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    pub record_set: RecordSet,
}

impl Change {
    /// Build the UPSERT published for a PoP hostname.
    #[must_use]
    pub fn upsert(name: String, record_type: RecordType, records: Vec<String>) -> Self {
        Self {
            action: ChangeAction::Upsert,
            record_set: RecordSet {
                name,
                record_type,
                ttl: Some(PUBLISHED_RECORD_TTL_SECS),
                records,
            },
        }
    }

    /// Build a DELETE for an existing record set.
    ///
    /// The provider requires the full existing record set to delete it, so it
    /// is carried unchanged.
    #[must_use]
    pub fn delete(existing: RecordSet) -> Self {
        Self {
            action: ChangeAction::Delete,
            record_set: existing,
        }
    }

    /// Number of record values in this change.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.record_set.records.len()
    }

    /// Total characters of all record values in this change.
    #[must_use]
    pub fn value_chars(&self) -> usize {
        self.record_set.records.iter().map(String::len).sum()
    }
}

/// An ordered group of changes submitted in one provider call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
}

impl ChangeBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Total record values across the batch.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.changes.iter().map(Change::record_count).sum()
    }

    /// Total record value characters across the batch.
    #[must_use]
    pub fn value_chars(&self) -> usize {
        self.changes.iter().map(Change::value_chars).sum()
    }
}

/// Published hostname for a PoP under a managed domain: `<code>.<domain>`.
#[must_use]
pub fn pop_hostname(code: &str, domain: &str) -> String {
    format!("{}.{}", code.to_lowercase(), domain)
}

/// Canonical form of a DNS name for comparisons (lower-case, no trailing dot).
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
