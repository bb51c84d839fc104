// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pagination helpers for provider zone listings.
//!
//! The provider returns record sets one page at a time with a cursor for the
//! next page. This module follows the cursor until the listing is complete.
//! Each page is fetched through the apply client, so listing is rate-limited
//! and retried like any other provider call.

use tracing::debug;

use crate::dns_errors::ProviderError;
use crate::reconcilers::apply::ApplyClient;
use crate::records::RecordSet;

/// List every record set in the client's zone.
///
/// # Errors
///
/// Returns an error if a page cannot be fetched, or
/// `ProviderError::MalformedResponse` if a page carries no record sets.
pub async fn list_all_record_sets(client: &ApplyClient) -> Result<Vec<RecordSet>, ProviderError> {
    let mut all_items = Vec::new();
    let mut cursor = None;
    let mut page_count = 0;

    loop {
        page_count += 1;
        let page = client.list_page(cursor.as_ref()).await?;

        let items = page
            .record_sets
            .ok_or_else(|| ProviderError::MalformedResponse {
                operation: "ListRecordSets".to_string(),
                reason: format!("page {page_count} carries no record sets"),
            })?;
        let item_count = items.len();
        all_items.extend(items);

        debug!(
            zone_id = %client.zone_id(),
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from provider"
        );

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        total_pages = page_count,
        total_items = all_items.len(),
        "Completed paginated list operation"
    );

    Ok(all_items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
