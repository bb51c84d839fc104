// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP/JSON DNS-provider client.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET /zones/{zone}/rrsets?start_name=..&start_type=..` |
//! | change | `POST /zones/{zone}/rrsets/changes` with `{"changes": [...]}` |
//!
//! # Status Mapping
//!
//! | HTTP Code | Error |
//! |-----------|-------|
//! | 429 | `ProviderError::Throttled` |
//! | 5xx | `ProviderError::Server` |
//! | other 4xx | `ProviderError::Rejected` |
//! | no response | `ProviderError::Transport` |

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::{DnsProvider, ListCursor, RecordPage};
use crate::constants::PROVIDER_REQUEST_TIMEOUT_SECS;
use crate::dns_errors::ProviderError;
use crate::records::{ChangeBatch, RecordSet};

const LIST_OPERATION: &str = "ListRecordSets";
const CHANGE_OPERATION: &str = "ChangeRecordSets";

/// Listing response body.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    record_sets: Option<Vec<RecordSet>>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_record_name: Option<String>,
    #[serde(default)]
    next_record_type: Option<String>,
    #[serde(default)]
    next_record_identifier: Option<String>,
}

impl ListResponse {
    fn into_page(self) -> RecordPage {
        let next = match (self.is_truncated, self.next_record_name) {
            (true, Some(start_name)) => Some(ListCursor {
                start_name,
                start_type: self.next_record_type,
                start_identifier: self.next_record_identifier,
            }),
            _ => None,
        };
        RecordPage {
            record_sets: self.record_sets,
            next,
        }
    }
}

/// Provider client speaking the JSON record-set API.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl HttpProvider {
    /// Create a client for the API rooted at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not an absolute http(s) URL or the
    /// HTTP client cannot be built.
    pub fn new(endpoint: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base_url = build_api_url(endpoint)?;
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn zone_url(&self, zone_id: &str, tail: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Transport {
                operation: "build URL".to_string(),
                reason: format!("{} cannot be a base URL", self.base_url),
            })?
            .pop_if_empty()
            .push("zones")
            .push(zone_id.trim_start_matches('/'))
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &str,
        zone_id: &str,
    ) -> Result<Response, ProviderError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            operation = operation,
            zone_id = %zone_id,
            status = %status,
            error = %body,
            "Provider API request failed"
        );
        Err(map_status(status, operation, zone_id, body))
    }
}

/// Normalize a provider endpoint into a base URL.
///
/// A bare `host:port` is treated as `http://host:port`.
///
/// # Errors
///
/// Returns an error if the endpoint cannot be parsed.
pub fn build_api_url(endpoint: &str) -> anyhow::Result<Url> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let absolute = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&absolute)?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Provider endpoint {endpoint} cannot be used as a base URL");
    }
    Ok(url)
}

/// Map a non-success HTTP status to a provider error.
#[must_use]
pub fn map_status(status: StatusCode, operation: &str, zone_id: &str, body: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Throttled {
            operation: operation.to_string(),
            zone_id: zone_id.to_string(),
        }
    } else if status.is_server_error() {
        ProviderError::Server {
            operation: operation.to_string(),
            zone_id: zone_id.to_string(),
            status_code: status.as_u16(),
            reason: body,
        }
    } else {
        ProviderError::Rejected {
            operation: operation.to_string(),
            zone_id: zone_id.to_string(),
            status_code: status.as_u16(),
            reason: body,
        }
    }
}

#[async_trait]
impl DnsProvider for HttpProvider {
    async fn list_records(
        &self,
        zone_id: &str,
        cursor: Option<&ListCursor>,
    ) -> Result<RecordPage, ProviderError> {
        let mut url = self.zone_url(zone_id, &["rrsets"])?;
        if let Some(cursor) = cursor {
            let mut query = url.query_pairs_mut();
            query.append_pair("start_name", &cursor.start_name);
            if let Some(start_type) = &cursor.start_type {
                query.append_pair("start_type", start_type);
            }
            if let Some(identifier) = &cursor.start_identifier {
                query.append_pair("start_identifier", identifier);
            }
        }

        debug!(zone_id = %zone_id, url = %url, "Listing record sets");
        let response = self
            .send(self.client.get(url), LIST_OPERATION, zone_id)
            .await?;

        let body: ListResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    operation: LIST_OPERATION.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(body.into_page())
    }

    async fn change_records(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<(), ProviderError> {
        let url = self.zone_url(zone_id, &["rrsets", "changes"])?;

        debug!(
            zone_id = %zone_id,
            changes = batch.len(),
            records = batch.record_count(),
            "Submitting change batch"
        );
        self.send(self.client.post(url).json(batch), CHANGE_OPERATION, zone_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
