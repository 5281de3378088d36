use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Addresses found for one hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLookup {
    pub addresses: Arc<[IpAddr]>,
    /// Validity reported by the source records, `None` when the source has no TTL
    /// (hosts file, platform resolver).
    pub ttl: Option<Duration>,
}

impl HostLookup {
    pub fn new(addresses: Vec<IpAddr>, ttl: Option<Duration>) -> Self {
        Self {
            addresses: addresses.into(),
            ttl,
        }
    }
}

/// Hostname to address resolution used to dial upstreams addressed by name.
///
/// Implementations are shared by every upstream of a forwarder and must be safe
/// for concurrent use. A missing name is reported as
/// [`DomainError::HostNotFound`]; composite resolvers rely on that distinction.
#[async_trait]
pub trait BootstrapResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError>;

    fn name(&self) -> &str;
}
