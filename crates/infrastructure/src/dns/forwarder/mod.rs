mod race;

use crate::dns::bootstrap::{build_bootstrap, BootstrapOptions};
use crate::dns::upstream::TransportUpstreamFactory;
use async_trait::async_trait;
use fanout_dns_application::ports::{
    BootstrapResolver, ExchangeOutcome, ExchangeSignal, QueryForwarder, Upstream,
    UpstreamFactory, UpstreamOptions,
};
use fanout_dns_domain::{
    AttemptFailure, DomainError, ForwarderConfig, ForwarderOptions, UpstreamSpec,
};
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Forwards each query to all configured upstreams at once and answers
/// with whichever responds successfully first.
pub struct Forwarder {
    upstreams: Arc<[Arc<dyn Upstream>]>,
    bootstrap: Arc<dyn BootstrapResolver>,
    timeout: Duration,
}

impl Forwarder {
    pub async fn from_config(config: &ForwarderConfig) -> Result<Self, DomainError> {
        Self::new(&config.upstreams, config.options(), &TransportUpstreamFactory).await
    }

    /// Builds the bootstrap resolver from `options.bootstrap`, then one
    /// upstream per spec through `factory`.
    pub async fn new(
        specs: &[UpstreamSpec],
        options: ForwarderOptions,
        factory: &dyn UpstreamFactory,
    ) -> Result<Self, DomainError> {
        if specs.is_empty() {
            return Err(DomainError::NoUpstreamConfigured);
        }

        let bootstrap = build_bootstrap(
            &options.bootstrap,
            BootstrapOptions {
                timeout: options.effective_timeout(),
                insecure_skip_verify: options.insecure_skip_verify,
            },
        )?;

        Self::with_bootstrap(specs, &options, bootstrap, factory).await
    }

    /// Like [`Forwarder::new`] with an already built bootstrap resolver.
    ///
    /// If any upstream fails to build, the ones built before it are closed
    /// and the error names the failing index.
    pub async fn with_bootstrap(
        specs: &[UpstreamSpec],
        options: &ForwarderOptions,
        bootstrap: Arc<dyn BootstrapResolver>,
        factory: &dyn UpstreamFactory,
    ) -> Result<Self, DomainError> {
        if specs.is_empty() {
            return Err(DomainError::NoUpstreamConfigured);
        }

        let timeout = options.effective_timeout();
        let mut upstreams: Vec<Arc<dyn Upstream>> = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            let upstream_options = UpstreamOptions::new(Arc::clone(&bootstrap), timeout)
                .with_insecure_skip_verify(options.insecure_skip_verify)
                .with_tag(spec.tag.as_deref(), &spec.addr);

            match factory.build(&spec.addr, upstream_options) {
                Ok(upstream) => upstreams.push(upstream),
                Err(e) => {
                    warn!(index, addr = %spec.addr, error = %e, "Failed to init upstream");
                    if let Err(close_err) = close_all(&upstreams).await {
                        warn!(error = %close_err, "Failed to close upstreams after init error");
                    }
                    return Err(DomainError::UpstreamInit {
                        index,
                        addr: spec.addr.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            upstreams = upstreams.len(),
            timeout_ms = timeout.as_millis() as u64,
            bootstrap = bootstrap.name(),
            "Forwarder initialized"
        );

        Ok(Self {
            upstreams: upstreams.into(),
            bootstrap,
            timeout,
        })
    }

    pub fn upstreams(&self) -> &[Arc<dyn Upstream>] {
        &self.upstreams
    }

    pub fn bootstrap(&self) -> &Arc<dyn BootstrapResolver> {
        &self.bootstrap
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Races `query` across every upstream.
    ///
    /// `query` is copied before any upstream sees it. The race keeps running
    /// in the background when `signal` fires first; each attempt is still
    /// bounded by the upstream timeout.
    pub async fn exchange(
        &self,
        query: &Message,
        signal: &ExchangeSignal,
    ) -> Result<ExchangeOutcome, DomainError> {
        if let Some(reason) = signal.error() {
            return Err(reason);
        }

        let query = query.clone();
        let upstreams = Arc::clone(&self.upstreams);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let _ = tx.send(race::race(&upstreams, query).await);
        });

        tokio::select! {
            biased;
            result = rx => result.unwrap_or_else(|_| {
                Err(DomainError::Internal(
                    "race ended without a response or an error".to_string(),
                ))
            }),
            reason = signal.fired() => {
                debug!(error = %reason, "Exchange abandoned before any upstream answered");
                Err(reason)
            }
        }
    }

    /// Closes every upstream, even after one of them fails to close.
    pub async fn close(&self) -> Result<(), DomainError> {
        close_all(&self.upstreams).await
    }
}

async fn close_all(upstreams: &[Arc<dyn Upstream>]) -> Result<(), DomainError> {
    let mut failures = Vec::new();
    for (index, upstream) in upstreams.iter().enumerate() {
        if let Err(e) = upstream.close().await {
            failures.push(AttemptFailure::new(index, upstream.address(), e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DomainError::Close(failures))
    }
}

#[async_trait]
impl QueryForwarder for Forwarder {
    async fn exchange(
        &self,
        query: &Message,
        signal: &ExchangeSignal,
    ) -> Result<ExchangeOutcome, DomainError> {
        Forwarder::exchange(self, query, signal).await
    }

    async fn close(&self) -> Result<(), DomainError> {
        Forwarder::close(self).await
    }
}
