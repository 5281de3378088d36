use crate::dns::upstream::DnsUpstream;
use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup, Upstream, UpstreamOptions};
use fanout_dns_domain::{DnsProtocol, DomainError};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::system::SystemResolver;

/// Resolves hostnames by asking a DNS server given as an IP literal.
pub struct UpstreamResolver {
    address: String,
    upstream: DnsUpstream,
}

impl UpstreamResolver {
    /// `addr` must name its server by IP so that it never needs resolving itself.
    pub fn new(
        addr: &str,
        timeout: Duration,
        insecure_skip_verify: bool,
    ) -> Result<Self, DomainError> {
        let protocol: DnsProtocol = addr.parse()?;
        if protocol.needs_resolution() {
            return Err(DomainError::InvalidUpstreamAddress(format!(
                "bootstrap address '{}' must use an IP literal host",
                addr
            )));
        }

        // Never consulted: the target is already an IP.
        let unused_bootstrap: Arc<dyn BootstrapResolver> = Arc::new(SystemResolver::new(timeout));
        let options = UpstreamOptions::new(unused_bootstrap, timeout)
            .with_insecure_skip_verify(insecure_skip_verify);
        let options = UpstreamOptions {
            span: tracing::debug_span!("bootstrap", addr = %addr),
            ..options
        };

        Ok(Self {
            address: addr.trim().to_string(),
            upstream: DnsUpstream::new(addr, options)?,
        })
    }

    async fn query(&self, name: &Name, record_type: RecordType) -> Result<Message, DomainError> {
        let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(name.clone(), record_type));
        self.upstream.exchange(message).await
    }
}

fn collect_answers(message: &Message, addresses: &mut Vec<IpAddr>, min_ttl: &mut Option<u32>) {
    for record in message.answers() {
        let ip = match record.data() {
            RData::A(a) => IpAddr::V4(a.0),
            RData::AAAA(aaaa) => IpAddr::V6(aaaa.0),
            _ => continue,
        };
        if !addresses.contains(&ip) {
            addresses.push(ip);
        }
        *min_ttl = Some(min_ttl.map_or(record.ttl(), |t| t.min(record.ttl())));
    }
}

#[async_trait]
impl BootstrapResolver for UpstreamResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(HostLookup::new(vec![ip], None));
        }

        let name = Name::from_ascii(host).map_err(|e| {
            DomainError::InvalidUpstreamAddress(format!("Invalid hostname '{}': {}", host, e))
        })?;

        let (v4, v6) = tokio::join!(
            self.query(&name, RecordType::A),
            self.query(&name, RecordType::AAAA)
        );

        let mut addresses = Vec::new();
        let mut min_ttl = None;
        let mut first_error = None;
        for result in [v4, v6] {
            match result {
                Ok(message) if message.response_code() == ResponseCode::NoError => {
                    collect_answers(&message, &mut addresses, &mut min_ttl);
                }
                Ok(message) if message.response_code() == ResponseCode::NXDomain => {
                    debug!(host, "Bootstrap server reports no such name");
                }
                Ok(message) => {
                    let rcode = message.response_code();
                    debug!(host, rcode = ?rcode, "Bootstrap query failed");
                    first_error.get_or_insert(DomainError::InvalidDnsResponse(format!(
                        "{} answered {} for '{}'",
                        self.address, rcode, host
                    )));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if addresses.is_empty() {
            return Err(match first_error {
                Some(e) => e,
                None => DomainError::HostNotFound(host.to_string()),
            });
        }

        Ok(HostLookup::new(
            addresses,
            min_ttl.map(|ttl| Duration::from_secs(u64::from(ttl))),
        ))
    }

    fn name(&self) -> &str {
        &self.address
    }
}
