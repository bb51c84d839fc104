// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line and environment configuration.
//!
//! Every setting can be given as a flag or through its environment variable
//! (`HOST_ZONE_ID`, `DOMAINS`, `POP_FILE`, ...). Raw arguments are validated
//! into [`Settings`] before any network activity.
//!
//! # Example
//!
//! ```text
//! HOST_ZONE_ID=Z123 PROVIDER_ENDPOINT=https://dns-api.internal \
//!   DOMAINS=cdn.example.com,example.com popdns sync
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DNS_RESOLVER, DEFAULT_PROBE_HEADER, DEFAULT_SYNC_INTERVAL_SECS, DNS_PORT,
    DNS_QUERY_TIMEOUT_SECS, PROVIDER_MAX_CALLS_PER_WINDOW,
};
use crate::dns_errors::ConfigError;
use crate::inventory::shard_domains;
use crate::provider::http::build_api_url;

#[derive(Parser, Debug)]
#[command(name = "popdns", version)]
#[command(about = "Publish per-PoP DNS records that follow CDN geo-steering", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve every PoP hostname once and publish the records
    Sync,
    /// Run sync passes on a fixed interval until interrupted
    Watch {
        /// Seconds between passes
        #[arg(long = "interval", env = "SYNC_INTERVAL", default_value_t = DEFAULT_SYNC_INTERVAL_SECS)]
        interval_secs: u64,

        /// Serve Prometheus metrics on this port
        #[arg(long, env = "METRICS_PORT")]
        metrics_port: Option<u16>,
    },
    /// Delete every record set published for the inventory
    Cleanup,
    /// Report where each PoP hostname of DOMAIN is served from
    Check {
        /// Domain whose `<code>.<domain>` hostnames are checked
        domain: String,
    },
}

impl Command {
    /// Validate subcommand arguments.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero watch interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Watch { interval_secs: 0, .. } => Err(ConfigError::Invalid {
                name: "SYNC_INTERVAL",
                reason: "must be at least 1 second".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Location validation strategy.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    /// PTR lookup of the address (`server-<ip>.<code>...`)
    ReverseDns,
    /// HTTP HEAD probe reading the PoP response header
    ProbeHeader,
    /// Accept every resolved address
    None,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Hosted zone receiving the records
    #[arg(long = "zone-id", env = "HOST_ZONE_ID", global = true)]
    pub zone_id: Option<String>,

    /// Comma-separated managed domains
    #[arg(long, env = "DOMAINS", value_delimiter = ',', global = true)]
    pub domains: Vec<String>,

    /// PoP inventory file (JSON, or YAML by extension)
    #[arg(long = "pop-file", env = "POP_FILE", default_value = "pop.json", global = true)]
    pub pop_file: PathBuf,

    /// Base URL of the DNS-provider record API
    #[arg(long = "provider-endpoint", env = "PROVIDER_ENDPOINT", global = true)]
    pub provider_endpoint: Option<String>,

    /// Bearer token for the DNS-provider API
    #[arg(long = "provider-token", env = "PROVIDER_TOKEN", hide_env_values = true, global = true)]
    pub provider_token: Option<String>,

    /// Recursive resolver used for subnet-scoped queries
    #[arg(long = "dns-resolver", env = "DNS_RESOLVER", default_value = DEFAULT_DNS_RESOLVER, global = true)]
    pub dns_resolver: String,

    /// Seconds to wait for a DNS answer
    #[arg(long = "dns-timeout", env = "DNS_TIMEOUT", default_value_t = DNS_QUERY_TIMEOUT_SECS, global = true)]
    pub dns_timeout_secs: u64,

    /// How resolved addresses are checked against the PoP
    #[arg(long, env = "VALIDATION", value_enum, default_value_t = ValidationStrategy::ReverseDns, global = true)]
    pub validation: ValidationStrategy,

    /// Response header carrying the serving PoP for probe validation
    #[arg(long = "probe-header", env = "PROBE_HEADER", default_value = DEFAULT_PROBE_HEADER, global = true)]
    pub probe_header: String,

    /// Accept a PoP's configured neighbors as a valid location
    #[arg(
        long = "accept-neighbors",
        env = "ACCEPT_NEIGHBORS",
        default_value_t = true,
        action = clap::ArgAction::Set,
        global = true
    )]
    pub accept_neighbors: bool,

    /// Publish A records only
    #[arg(long = "skip-ipv6", env = "SKIP_IPV6", global = true)]
    pub skip_ipv6: bool,

    /// Index of this shard (requires SHARD_COUNT)
    #[arg(long = "shard-index", env = "SHARD_INDEX", global = true)]
    pub shard_index: Option<usize>,

    /// Number of shards the domain list is split into
    #[arg(long = "shard-count", env = "SHARD_COUNT", global = true)]
    pub shard_count: Option<usize>,

    /// Provider API calls allowed per second
    #[arg(long = "rate-limit", env = "RATE_LIMIT", default_value_t = PROVIDER_MAX_CALLS_PER_WINDOW, global = true)]
    pub rate_limit: usize,
}

/// Validated settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub zone_id: Option<String>,
    /// Domains handled by this shard
    pub domains: Vec<String>,
    pub pop_file: PathBuf,
    pub provider_endpoint: Option<String>,
    pub provider_token: Option<String>,
    pub dns_resolver: SocketAddr,
    pub dns_timeout: Duration,
    pub validation: ValidationStrategy,
    pub probe_header: String,
    pub accept_neighbors: bool,
    pub skip_ipv6: bool,
    pub rate_limit: usize,
}

impl Settings {
    /// Validate `args`.
    ///
    /// With `requires_provider` the zone, provider endpoint and domains must
    /// all be set (sync, watch, cleanup).
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn from_args(args: &GlobalArgs, requires_provider: bool) -> Result<Self, ConfigError> {
        let zone_id = non_empty(args.zone_id.as_deref());
        let provider_endpoint = non_empty(args.provider_endpoint.as_deref());

        if requires_provider {
            if zone_id.is_none() {
                return Err(ConfigError::Missing {
                    name: "HOST_ZONE_ID",
                });
            }
            if provider_endpoint.is_none() {
                return Err(ConfigError::Missing {
                    name: "PROVIDER_ENDPOINT",
                });
            }
        }
        if let Some(endpoint) = &provider_endpoint {
            build_api_url(endpoint).map_err(|e| ConfigError::Invalid {
                name: "PROVIDER_ENDPOINT",
                reason: e.to_string(),
            })?;
        }

        let all_domains: Vec<String> = args
            .domains
            .iter()
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if requires_provider && all_domains.is_empty() {
            return Err(ConfigError::Missing { name: "DOMAINS" });
        }

        let shard = parse_shard(args.shard_index, args.shard_count)?;
        let domains = shard_domains(&all_domains, shard);

        if args.dns_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "DNS_TIMEOUT",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if args.rate_limit == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            zone_id,
            domains,
            pop_file: args.pop_file.clone(),
            provider_endpoint,
            provider_token: non_empty(args.provider_token.as_deref()),
            dns_resolver: parse_resolver(&args.dns_resolver)?,
            dns_timeout: Duration::from_secs(args.dns_timeout_secs),
            validation: args.validation,
            probe_header: args.probe_header.trim().to_lowercase(),
            accept_neighbors: args.accept_neighbors,
            skip_ipv6: args.skip_ipv6,
            rate_limit: args.rate_limit,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn parse_shard(
    index: Option<usize>,
    count: Option<usize>,
) -> Result<Option<(usize, usize)>, ConfigError> {
    match (index, count) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Missing {
            name: "SHARD_COUNT",
        }),
        (None, Some(_)) => Err(ConfigError::Missing {
            name: "SHARD_INDEX",
        }),
        (Some(_), Some(0)) => Err(ConfigError::Invalid {
            name: "SHARD_COUNT",
            reason: "must be at least 1".to_string(),
        }),
        (Some(index), Some(count)) if index >= count => Err(ConfigError::Invalid {
            name: "SHARD_INDEX",
            reason: format!("{index} is not below SHARD_COUNT {count}"),
        }),
        (Some(index), Some(count)) => Ok(Some((index, count))),
    }
}

/// Accept `ip:port` or a bare IP (port 53).
fn parse_resolver(value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    value
        .parse::<SocketAddr>()
        .or_else(|_| {
            value
                .parse::<IpAddr>()
                .map(|ip| SocketAddr::new(ip, DNS_PORT))
        })
        .map_err(|_| ConfigError::Invalid {
            name: "DNS_RESOLVER",
            reason: format!("'{value}' is not an IP address or IP:port"),
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
