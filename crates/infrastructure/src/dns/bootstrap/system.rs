use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::DomainError;
use std::net::IpAddr;
use std::time::Duration;

/// Platform resolver (`getaddrinfo`) reached through `tokio::net::lookup_host`.
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl BootstrapResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(HostLookup::new(vec![ip], None));
        }

        let resolved = tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 0)))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: format!("system resolver ({})", host),
            })?
            .map_err(|e| DomainError::IoError(format!("System lookup of {} failed: {}", host, e)))?;

        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in resolved {
            if !addresses.contains(&addr.ip()) {
                addresses.push(addr.ip());
            }
        }

        if addresses.is_empty() {
            return Err(DomainError::HostNotFound(host.to_string()));
        }

        Ok(HostLookup::new(addresses, None))
    }

    fn name(&self) -> &str {
        "system"
    }
}
