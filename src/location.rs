// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PoP location validation.
//!
//! An address returned for a PoP's subnet is only useful if it is actually
//! served by that PoP. Two interchangeable strategies observe where an
//! address terminates:
//!
//! - [`ReverseDnsValidator`] - PTR lookup; CDN edge servers are named
//!   `server-<dashed-ip>.<pop-code>...`
//! - [`ProbeHeaderValidator`] - HTTP `HEAD` to the address; the serving PoP is
//!   reported in a response header (`x-amz-cf-pop` by default)
//!
//! Both return an observed location code that [`match_location`] compares
//! against the expected PoP code and its neighbors.

use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::rr::{DNSClass, Name, RecordType as WireRecordType};
use hickory_client::udp::UdpClientConnection;
use reqwest::header::HOST;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::constants::{DNS_QUERY_TIMEOUT_SECS, PROBE_TIMEOUT_SECS, REVERSE_HOSTNAME_PREFIX};
use crate::dns_errors::LocationError;
use crate::records::RecordType;

/// Observes which PoP answers for an address.
#[async_trait]
pub trait LocationValidator: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy can validate addresses of `record_type`.
    fn applies_to(&self, _record_type: &RecordType) -> bool {
        true
    }

    /// Observe the location serving `address` for `hostname`.
    ///
    /// # Errors
    ///
    /// Strategy-specific; callers treat any error as an unknown location.
    async fn observe(&self, hostname: &str, address: &str) -> Result<String, LocationError>;
}

/// Result of comparing an observed location with the expected PoP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationMatch {
    /// Observed location is the expected PoP
    Direct,
    /// Observed location is one of the PoP's accepted neighbors
    Neighbor(String),
    /// Observed location is somewhere else (or unknown)
    Mismatch,
}

/// Compare `observed` against the expected PoP code and its neighbors.
///
/// Matching is a case-insensitive prefix match, since CDN location codes
/// carry a suffix (`NRT57-P1` for PoP `nrt57`).
#[must_use]
pub fn match_location(
    observed: &str,
    expected_code: &str,
    neighbors: &BTreeSet<String>,
    accept_neighbors: bool,
) -> LocationMatch {
    let observed = observed.to_lowercase();
    if observed.starts_with(&expected_code.to_lowercase()) {
        return LocationMatch::Direct;
    }
    if accept_neighbors {
        if let Some(neighbor) = neighbors
            .iter()
            .find(|n| !n.is_empty() && observed.starts_with(&n.to_lowercase()))
        {
            return LocationMatch::Neighbor(neighbor.clone());
        }
    }
    LocationMatch::Mismatch
}

// ============================================================================
// Reverse DNS strategy
// ============================================================================

/// Validates via the PTR name of the address.
#[derive(Debug, Clone)]
pub struct ReverseDnsValidator {
    server: SocketAddr,
    timeout: Duration,
}

impl ReverseDnsValidator {
    #[must_use]
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: Duration::from_secs(DNS_QUERY_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn reverse_lookup(&self, address: &str) -> Result<Option<String>, LocationError> {
        let lookup_error = |reason: String| LocationError::Lookup {
            address: address.to_string(),
            reason,
        };

        let ip: IpAddr = address
            .parse()
            .map_err(|_| lookup_error("not an IP address".to_string()))?;
        let reverse_name = reverse_lookup_name(ip);
        let server = self.server;
        let timeout = self.timeout;

        // hickory-client's sync client blocks, keep it off the runtime threads
        tokio::task::spawn_blocking(move || -> Result<Option<String>, String> {
            let conn = UdpClientConnection::with_timeout(server, timeout)
                .map_err(|e| format!("failed to create UDP connection: {e}"))?;
            let client = SyncClient::new(conn);

            let response = client
                .query(&reverse_name, DNSClass::IN, WireRecordType::PTR)
                .map_err(|e| format!("PTR query for {reverse_name} failed: {e}"))?;

            Ok(response
                .answers()
                .iter()
                .filter(|r| r.record_type() == WireRecordType::PTR)
                .filter_map(|r| r.data())
                .map(|data| data.to_string().trim_end_matches('.').to_string())
                .find(|name| !name.is_empty()))
        })
        .await
        .map_err(|e| lookup_error(format!("reverse lookup task failed: {e}")))?
        .map_err(lookup_error)
    }
}

#[async_trait]
impl LocationValidator for ReverseDnsValidator {
    fn name(&self) -> &'static str {
        "reverse-dns"
    }

    /// Edge server PTR naming only exists for IPv4 addresses.
    fn applies_to(&self, record_type: &RecordType) -> bool {
        *record_type == RecordType::A
    }

    async fn observe(&self, _hostname: &str, address: &str) -> Result<String, LocationError> {
        let reverse = self
            .reverse_lookup(address)
            .await?
            .ok_or_else(|| LocationError::NoReverseHostname {
                address: address.to_string(),
            })?;

        debug!(address = %address, reverse = %reverse, "Reverse hostname");
        Ok(location_from_reverse_hostname(address, &reverse))
    }
}

/// The `in-addr.arpa` / `ip6.arpa` name for a PTR lookup of `ip`.
#[must_use]
pub fn reverse_lookup_name(ip: IpAddr) -> Name {
    Name::from(ip)
}

/// Extract the PoP label from an edge server reverse hostname.
///
/// `server-10-0-0-1.nyc50.r.cdn.net` for `10.0.0.1` yields `nyc50`. A
/// hostname for a different address or outside the naming scheme yields an
/// empty location.
#[must_use]
pub fn location_from_reverse_hostname(address: &str, reverse: &str) -> String {
    let prefix = format!(
        "{REVERSE_HOSTNAME_PREFIX}{}.",
        address.replace(['.', ':'], "-")
    );
    let lowered = reverse.to_lowercase();
    match lowered.strip_prefix(&prefix.to_lowercase()) {
        Some(rest) => rest.split('.').next().unwrap_or_default().to_string(),
        None => String::new(),
    }
}

// ============================================================================
// HTTP probe strategy
// ============================================================================

/// Validates by asking the edge server which PoP it is.
#[derive(Debug, Clone)]
pub struct ProbeHeaderValidator {
    client: reqwest::Client,
    header: String,
    port: u16,
}

impl ProbeHeaderValidator {
    /// Create a probe validator reading `header` from `HEAD` responses.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(header: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            header: header.to_lowercase(),
            port: 80,
        })
    }

    /// Probe a non-standard port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn probe_url(&self, address: &str) -> Option<Url> {
        let ip: IpAddr = address.parse().ok()?;
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        Url::parse(&format!("http://{host}:{}/", self.port)).ok()
    }
}

#[async_trait]
impl LocationValidator for ProbeHeaderValidator {
    fn name(&self) -> &'static str {
        "probe-header"
    }

    /// Connection and protocol errors yield an empty location, never an error.
    async fn observe(&self, hostname: &str, address: &str) -> Result<String, LocationError> {
        let Some(url) = self.probe_url(address) else {
            debug!(address = %address, "Cannot build probe URL, location unknown");
            return Ok(String::new());
        };

        match self.client.head(url).header(HOST, hostname).send().await {
            Ok(response) => {
                let location = response
                    .headers()
                    .get(self.header.as_str())
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                debug!(
                    address = %address,
                    status = %response.status(),
                    location = %location,
                    "Probe response"
                );
                Ok(location)
            }
            Err(e) => {
                debug!(address = %address, error = %e, "Probe failed, location unknown");
                Ok(String::new())
            }
        }
    }
}

#[cfg(test)]
#[path = "location_tests.rs"]
mod location_tests;
