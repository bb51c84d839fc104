// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for popdns.
//!
//! This module provides specialized error types for:
//! - Subnet-scoped address resolution
//! - PoP location validation (reverse DNS and HTTP probes)
//! - DNS-provider record management API calls
//! - Configuration and inventory loading
//!
//! Each component returns its own error enum so callers can decide what is
//! retryable without parsing error strings.

use thiserror::Error;

/// Errors that can occur while resolving addresses for a hostname.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The resolver answered but no valid IPv4/IPv6 literal was present.
    #[error("No {record_type} addresses found for {hostname} (subnet {subnet})")]
    NoAddressFound {
        /// The hostname that was queried
        hostname: String,
        /// Record type that was queried (A or AAAA)
        record_type: String,
        /// Client subnet hint sent with the query
        subnet: String,
    },

    /// The query could not be built, sent or decoded.
    #[error("DNS query for {hostname} via {server} failed: {reason}")]
    Query {
        /// The hostname that was queried
        hostname: String,
        /// Resolver endpoint (IP:port)
        server: String,
        /// Specific reason for the failure
        reason: String,
    },

    /// No response arrived before the query timeout.
    #[error("DNS query for {hostname} via {server} timed out after {timeout_ms}ms")]
    Timeout {
        /// The hostname that was queried
        hostname: String,
        /// Resolver endpoint (IP:port)
        server: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The PoP subnet is not a valid CIDR string.
    #[error("Invalid client subnet '{subnet}': {reason}")]
    InvalidSubnet {
        /// The subnet string as configured
        subnet: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Errors raised by location validation strategies.
#[derive(Error, Debug, Clone)]
pub enum LocationError {
    /// The PTR lookup returned no hostname for the address.
    #[error("No reverse hostname found for {address}")]
    NoReverseHostname {
        /// The address that was reverse-resolved
        address: String,
    },

    /// The reverse lookup itself failed.
    #[error("Reverse lookup of {address} failed: {reason}")]
    Lookup {
        /// The address that was reverse-resolved
        address: String,
        /// Specific reason for the failure
        reason: String,
    },
}

/// Errors returned by the DNS-provider record management API.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider rejected the call because of request rate (HTTP 429).
    #[error("Provider throttled {operation} for zone {zone_id}")]
    Throttled {
        /// API operation (e.g., `ChangeRecords`)
        operation: String,
        /// Hosted zone identifier
        zone_id: String,
    },

    /// The provider failed internally (HTTP 5xx).
    #[error("Provider {operation} failed for zone {zone_id} (HTTP {status_code}): {reason}")]
    Server {
        /// API operation (e.g., `ChangeRecords`)
        operation: String,
        /// Hosted zone identifier
        zone_id: String,
        /// HTTP status code
        status_code: u16,
        /// Response body or error message
        reason: String,
    },

    /// The provider refused the request (HTTP 4xx other than 429).
    #[error("Provider rejected {operation} for zone {zone_id} (HTTP {status_code}): {reason}")]
    Rejected {
        /// API operation (e.g., `ChangeRecords`)
        operation: String,
        /// Hosted zone identifier
        zone_id: String,
        /// HTTP status code
        status_code: u16,
        /// Response body or error message
        reason: String,
    },

    /// The request never produced an HTTP response.
    #[error("Provider {operation} request failed: {reason}")]
    Transport {
        /// API operation (e.g., `ListRecords`)
        operation: String,
        /// Reason for the connection failure
        reason: String,
    },

    /// The response could not be interpreted.
    #[error("Malformed provider response for {operation}: {reason}")]
    MalformedResponse {
        /// API operation (e.g., `ListRecords`)
        operation: String,
        /// Explanation of what is malformed
        reason: String,
    },
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    ///
    /// Throttling, server failures and transport errors are transient;
    /// rejected requests and malformed responses are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Server { .. } | Self::Transport { .. }
        )
    }
}

/// Errors found while validating process configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("{name} is not defined")]
    Missing {
        /// Environment variable / flag name
        name: &'static str,
    },

    /// A setting was provided with an unusable value.
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Environment variable / flag name
        name: &'static str,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Errors raised while loading the PoP inventory.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The inventory file could not be read.
    #[error("Failed to read PoP inventory {path}: {source}")]
    Read {
        /// Path of the inventory file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The inventory file is not valid JSON/YAML for the expected schema.
    #[error("Failed to parse PoP inventory {path}: {reason}")]
    Parse {
        /// Path of the inventory file
        path: String,
        /// Parser error message
        reason: String,
    },
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
