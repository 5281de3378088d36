//! Resolvers used to find the addresses of upstreams configured by hostname.

mod caching;
mod hosts;
mod parallel;
mod sequential;
mod system;
mod upstream_resolver;

pub use caching::{cache_ttl, CachingResolver, DEFAULT_CACHE_TTL, MAX_CACHE_TTL, MIN_CACHE_TTL};
pub use hosts::HostsResolver;
pub use parallel::ParallelResolver;
pub use sequential::SequentialResolver;
pub use system::SystemResolver;
pub use upstream_resolver::UpstreamResolver;

use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::DomainError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions {
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
}

/// Builds the resolver shared by all upstreams of one forwarder.
///
/// - no addresses: hosts file, then the platform resolver
/// - one address: that server, cached
/// - several: all of them in parallel, each cached
pub fn build_bootstrap(
    addresses: &[String],
    options: BootstrapOptions,
) -> Result<Arc<dyn BootstrapResolver>, DomainError> {
    let mut resolvers: Vec<Arc<dyn BootstrapResolver>> = Vec::with_capacity(addresses.len());

    for (index, addr) in addresses.iter().enumerate() {
        let resolver = UpstreamResolver::new(addr, options.timeout, options.insecure_skip_verify)
            .map_err(|e| DomainError::Bootstrap {
                index,
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        resolvers.push(Arc::new(CachingResolver::new(Arc::new(resolver))));
    }

    let resolver = match resolvers.len() {
        0 => default_resolver(HostsResolver::from_system(), options.timeout),
        1 => resolvers.swap_remove(0),
        _ => Arc::new(ParallelResolver::new(resolvers)),
    };

    info!(addresses = addresses.len(), resolver = resolver.name(), "Bootstrap resolver ready");
    Ok(resolver)
}

/// Hosts table in front of the platform resolver, or the platform resolver
/// alone when the hosts table could not be loaded.
pub fn default_resolver(
    hosts: Result<HostsResolver, DomainError>,
    timeout: Duration,
) -> Arc<dyn BootstrapResolver> {
    let system: Arc<dyn BootstrapResolver> = Arc::new(SystemResolver::new(timeout));
    match hosts {
        Ok(hosts) => Arc::new(SequentialResolver::new(vec![Arc::new(hosts), system])),
        Err(e) => {
            debug!(error = %e, "Hosts file unavailable, using system resolver only");
            system
        }
    }
}
