use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::{AttemptFailure, DomainError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Queries every resolver at once and returns the first success.
pub struct ParallelResolver {
    resolvers: Vec<Arc<dyn BootstrapResolver>>,
}

impl ParallelResolver {
    pub fn new(resolvers: Vec<Arc<dyn BootstrapResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl BootstrapResolver for ParallelResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        let mut pending: FuturesUnordered<_> = self
            .resolvers
            .iter()
            .enumerate()
            .map(|(index, resolver)| async move { (index, resolver.lookup(host).await) })
            .collect();

        let mut failures = Vec::new();
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(lookup) => {
                    debug!(host, resolver = self.resolvers[index].name(), "Bootstrap lookup won");
                    return Ok(lookup);
                }
                Err(e) => {
                    failures.push(AttemptFailure::new(index, self.resolvers[index].name(), e))
                }
            }
        }

        failures.sort_by_key(|f| f.index);
        Err(DomainError::AllResolversFailed(failures))
    }

    fn name(&self) -> &str {
        "parallel"
    }
}
