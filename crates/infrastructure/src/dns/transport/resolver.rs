use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::{DomainError, UpstreamAddr};
use smallvec::SmallVec;
use std::net::SocketAddr;
use std::time::Duration;

pub type DialTargets = SmallVec<[SocketAddr; 4]>;

/// Turns an upstream address into socket addresses to dial, asking the
/// bootstrap resolver when the host is a name.
pub async fn resolve_targets(
    addr: &UpstreamAddr,
    bootstrap: &dyn BootstrapResolver,
    timeout: Duration,
) -> Result<DialTargets, DomainError> {
    let (hostname, port) = match addr {
        UpstreamAddr::Resolved(addr) => return Ok(SmallVec::from_elem(*addr, 1)),
        UpstreamAddr::Unresolved { hostname, port } => (hostname, *port),
    };

    let lookup = tokio::time::timeout(timeout, bootstrap.lookup(hostname))
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: format!("{} (bootstrap {})", hostname, bootstrap.name()),
        })??;

    let targets: DialTargets = lookup
        .addresses
        .iter()
        .map(|ip| SocketAddr::new(*ip, port))
        .collect();

    if targets.is_empty() {
        return Err(DomainError::HostNotFound(hostname.to_string()));
    }

    Ok(targets)
}
