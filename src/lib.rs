// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # popdns - per-PoP DNS records for CDN geo-steering
//!
//! popdns publishes one hostname per CDN point of presence (`<code>.<domain>`)
//! whose A/AAAA records are the addresses the CDN returns to clients in that
//! PoP's subnet. Addresses are obtained with EDNS Client Subnet queries and
//! checked against the PoP before they are written to the hosted zone.
//!
//! ## Modules
//!
//! - [`inventory`] - PoP inventory loading, filtering and domain sharding
//! - [`resolver`] - Subnet-scoped address resolution (EDNS Client Subnet)
//! - [`location`] - Validation of the serving location of an address
//! - [`records`] - Record sets, changes and change batches
//! - [`provider`] - DNS-provider record API
//! - [`reconcilers`] - Sync, cleanup and check passes
//! - [`config`] - Command line and environment settings
//! - [`context`] - Runtime wiring built from the settings
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use popdns::inventory::Pop;
//! use popdns::records::pop_hostname;
//!
//! let pop = Pop::new("NRT57", "203.0.113.0/24");
//! assert_eq!(pop_hostname(&pop.code, "cdn.example.com"), "nrt57.cdn.example.com");
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod dns_errors;
pub mod inventory;
pub mod location;
pub mod metrics;
pub mod provider;
pub mod reconcilers;
pub mod records;
pub mod resolver;
