// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS-provider record management.
//!
//! The reconciler only needs two operations from a provider: list the record
//! sets of a zone one page at a time, and submit a batch of changes. Both are
//! expressed by the [`DnsProvider`] trait; [`http::HttpProvider`] implements
//! it against a JSON record-set API.
//!
//! Implementations do not retry or rate-limit. The apply client wraps every
//! call with both.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dns_errors::ProviderError;
use crate::records::{ChangeBatch, RecordSet};

/// Position to resume a record set listing from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCursor {
    pub start_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_identifier: Option<String>,
}

/// One page of a zone listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Record sets on this page; `None` when the provider omitted them
    pub record_sets: Option<Vec<RecordSet>>,
    /// Cursor for the next page, if the listing is truncated
    pub next: Option<ListCursor>,
}

/// Record-set operations offered by a DNS provider.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Fetch one page of record sets from `zone_id`, starting at `cursor`.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` describing the failed call.
    async fn list_records(
        &self,
        zone_id: &str,
        cursor: Option<&ListCursor>,
    ) -> Result<RecordPage, ProviderError>;

    /// Submit `batch` to `zone_id` as a single change request.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` describing the failed call.
    async fn change_records(&self, zone_id: &str, batch: &ChangeBatch)
        -> Result<(), ProviderError>;
}
