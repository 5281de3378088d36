use super::hosts::normalize;
use async_trait::async_trait;
use dashmap::DashMap;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::DomainError;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const MIN_CACHE_TTL: Duration = Duration::from_secs(1);
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Used when the source reports no TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CachedLookup {
    lookup: HostLookup,
    expires_at: Instant,
}

/// Remembers successful lookups of the wrapped resolver until their TTL
/// runs out. Failures are never cached.
pub struct CachingResolver {
    inner: Arc<dyn BootstrapResolver>,
    cache: DashMap<String, CachedLookup, FxBuildHasher>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn BootstrapResolver>) -> Self {
        Self {
            inner,
            cache: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

pub fn cache_ttl(reported: Option<Duration>) -> Duration {
    reported
        .map(|ttl| ttl.clamp(MIN_CACHE_TTL, MAX_CACHE_TTL))
        .unwrap_or(DEFAULT_CACHE_TTL)
}

#[async_trait]
impl BootstrapResolver for CachingResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        let key = normalize(host);

        if let Some(entry) = self.cache.get(&key) {
            if entry.expires_at > Instant::now() {
                debug!(host, "Bootstrap cache hit");
                return Ok(entry.lookup.clone());
            }
        }

        let lookup = self.inner.lookup(host).await?;
        let ttl = cache_ttl(lookup.ttl);
        self.cache.insert(
            key,
            CachedLookup {
                lookup: lookup.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        debug!(host, ttl_secs = ttl.as_secs(), "Bootstrap lookup cached");

        Ok(lookup)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
