use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::DomainError;
use std::sync::Arc;
use tracing::debug;

/// Asks each resolver in order. Only a "not found" answer moves on to the
/// next one; any other failure is returned as is.
pub struct SequentialResolver {
    resolvers: Vec<Arc<dyn BootstrapResolver>>,
}

impl SequentialResolver {
    pub fn new(resolvers: Vec<Arc<dyn BootstrapResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl BootstrapResolver for SequentialResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        for resolver in &self.resolvers {
            match resolver.lookup(host).await {
                Ok(lookup) => return Ok(lookup),
                Err(e) if e.is_not_found() => {
                    debug!(host, resolver = resolver.name(), "Not found, trying next resolver");
                }
                Err(e) => return Err(e),
            }
        }
        Err(DomainError::HostNotFound(host.to_string()))
    }

    fn name(&self) -> &str {
        "sequential"
    }
}
