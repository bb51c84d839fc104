// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Subnet-scoped address resolution.
//!
//! Queries a trusted recursive resolver with an EDNS Client Subnet option
//! (RFC 7871) so the answer is the one a client inside the PoP's subnet
//! would receive from the CDN's geo-steering.
//!
//! Truncated UDP answers are retried once over TCP. No other retry happens
//! here; the change resolver owns retry policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use popdns::records::RecordType;
//! use popdns::resolver::{AddressResolver, EcsResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let resolver = EcsResolver::new("8.8.8.8:53".parse()?);
//! let addresses = resolver
//!     .resolve("cdn.example.com", &RecordType::A, "1.2.3.0/24")
//!     .await?;
//! println!("{addresses:?}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsOption};
use hickory_proto::rr::{Name, RecordType as WireRecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

use crate::constants::{DNS_QUERY_TIMEOUT_SECS, DNS_RECV_BUFFER_BYTES, EDNS_MAX_PAYLOAD};
use crate::dns_errors::ResolveError;
use crate::records::RecordType;

/// Resolves the addresses a client in `subnet` receives for a hostname.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `hostname` for `record_type` as seen from `subnet`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::NoAddressFound` if no valid address is
    /// returned, or a query/timeout error if the resolver is unreachable.
    async fn resolve(
        &self,
        hostname: &str,
        record_type: &RecordType,
        subnet: &str,
    ) -> Result<Vec<String>, ResolveError>;
}

/// UDP resolver that attaches an EDNS Client Subnet option to every query.
#[derive(Debug, Clone)]
pub struct EcsResolver {
    server: SocketAddr,
    timeout: Duration,
}

impl EcsResolver {
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

    fn query_error(&self, hostname: &str, reason: impl ToString) -> ResolveError {
        ResolveError::Query {
            hostname: hostname.to_string(),
            server: self.server.to_string(),
            reason: reason.to_string(),
        }
    }

    fn timeout_error(&self, hostname: &str) -> ResolveError {
        ResolveError::Timeout {
            hostname: hostname.to_string(),
            server: self.server.to_string(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn exchange_udp(
        &self,
        hostname: &str,
        request: &Message,
    ) -> Result<Message, ResolveError> {
        let bytes = request
            .to_vec()
            .map_err(|e| self.query_error(hostname, e))?;

        let local: SocketAddr = if self.server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| self.query_error(hostname, e))?;
        socket
            .connect(self.server)
            .await
            .map_err(|e| self.query_error(hostname, e))?;
        socket
            .send(&bytes)
            .await
            .map_err(|e| self.query_error(hostname, e))?;

        let receive = async {
            let mut buf = vec![0u8; DNS_RECV_BUFFER_BYTES];
            loop {
                let len = socket
                    .recv(&mut buf)
                    .await
                    .map_err(|e| self.query_error(hostname, e))?;
                let response =
                    Message::from_vec(&buf[..len]).map_err(|e| self.query_error(hostname, e))?;
                // Stray datagrams for other ids are dropped
                if response.id() == request.id() {
                    return Ok(response);
                }
            }
        };

        tokio::time::timeout(self.timeout, receive)
            .await
            .map_err(|_| self.timeout_error(hostname))?
    }

    /// Repeat `request` over TCP with the two-byte length framing.
    async fn exchange_tcp(
        &self,
        hostname: &str,
        request: &Message,
    ) -> Result<Message, ResolveError> {
        let bytes = request
            .to_vec()
            .map_err(|e| self.query_error(hostname, e))?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| self.query_error(hostname, "query too large for TCP framing"))?;

        let exchange = async {
            let mut stream = TcpStream::connect(self.server)
                .await
                .map_err(|e| self.query_error(hostname, e))?;
            stream
                .write_all(&len.to_be_bytes())
                .await
                .map_err(|e| self.query_error(hostname, e))?;
            stream
                .write_all(&bytes)
                .await
                .map_err(|e| self.query_error(hostname, e))?;

            let mut len_buf = [0u8; 2];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| self.query_error(hostname, e))?;
            let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream
                .read_exact(&mut buf)
                .await
                .map_err(|e| self.query_error(hostname, e))?;

            let response = Message::from_vec(&buf).map_err(|e| self.query_error(hostname, e))?;
            if response.id() != request.id() {
                return Err(self.query_error(hostname, "TCP response id mismatch"));
            }
            Ok(response)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| self.timeout_error(hostname))?
    }
}

#[async_trait]
impl AddressResolver for EcsResolver {
    async fn resolve(
        &self,
        hostname: &str,
        record_type: &RecordType,
        subnet: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let request = build_query(hostname, record_type, subnet)?;
        let mut response = self.exchange_udp(hostname, &request).await?;
        if response.truncated() {
            debug!(
                hostname = %hostname,
                server = %self.server,
                "Response truncated, retrying over TCP"
            );
            response = self.exchange_tcp(hostname, &request).await?;
            if response.truncated() {
                return Err(self.query_error(hostname, "truncated response over TCP"));
            }
        }

        let code = response.response_code();
        if code != ResponseCode::NoError && code != ResponseCode::NXDomain {
            return Err(self.query_error(hostname, format!("response code {code:?}")));
        }

        let addresses = addresses_from_response(&response);
        debug!(
            hostname = %hostname,
            record_type = %record_type,
            subnet = %subnet,
            addresses = ?addresses,
            "Resolved subnet-scoped addresses"
        );

        if addresses.is_empty() {
            return Err(ResolveError::NoAddressFound {
                hostname: hostname.to_string(),
                record_type: record_type.to_string(),
                subnet: subnet.to_string(),
            });
        }
        Ok(addresses)
    }
}

/// Build a recursive query message carrying the client subnet hint.
///
/// # Errors
///
/// Returns an error if the hostname, record type or subnet is invalid.
pub fn build_query(
    hostname: &str,
    record_type: &RecordType,
    subnet: &str,
) -> Result<Message, ResolveError> {
    let invalid = |reason: String| ResolveError::Query {
        hostname: hostname.to_string(),
        server: String::new(),
        reason,
    };

    let name = Name::from_str(&format!("{}.", hostname.trim_end_matches('.')))
        .map_err(|e| invalid(format!("invalid hostname: {e}")))?;
    let wire_type = WireRecordType::from_str(record_type.as_str())
        .map_err(|e| invalid(format!("invalid record type: {e}")))?;

    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_MAX_PAYLOAD);
    edns.options_mut().insert(client_subnet_option(subnet)?);

    let mut message = Message::new();
    message
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, wire_type));
    message.set_edns(edns);
    Ok(message)
}

/// Build the EDNS Client Subnet option for `subnet`.
///
/// The address is masked to the source prefix so no host bits leave the
/// process. A bare address is treated as a host prefix. Scope is always 0 in
/// queries.
///
/// # Errors
///
/// Returns `ResolveError::InvalidSubnet` for malformed CIDR strings.
pub fn client_subnet_option(subnet: &str) -> Result<EdnsOption, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidSubnet {
        subnet: subnet.to_string(),
        reason: reason.to_string(),
    };

    let (addr_part, prefix_part) = match subnet.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (subnet, None),
    };
    let address: IpAddr = addr_part
        .trim()
        .parse()
        .map_err(|_| invalid("not an IP address"))?;

    let max_prefix: u8 = if address.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix_part {
        Some(p) => p
            .trim()
            .parse::<u8>()
            .map_err(|_| invalid("prefix length is not a number"))?,
        None => max_prefix,
    };
    if prefix > max_prefix {
        return Err(invalid("prefix length exceeds address size"));
    }

    let network = match address {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(u32::from(32 - prefix)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(u32::from(128 - prefix)).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    };

    Ok(EdnsOption::Subnet(ClientSubnet::new(network, prefix, 0)))
}

/// Collect the valid IPv4/IPv6 literals from a response's answer section.
///
/// CNAME chain entries and anything else that is not an address literal are
/// discarded; order is preserved.
#[must_use]
pub fn addresses_from_response(response: &Message) -> Vec<String> {
    response
        .answers()
        .iter()
        .filter_map(|record| record.data())
        .map(ToString::to_string)
        .filter(|value| value.parse::<IpAddr>().is_ok())
        .collect()
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
