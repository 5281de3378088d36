use super::BootstrapResolver;
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

/// One configured DNS server reached through one transport.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Exchange a query for a response. The query is owned: implementations may
    /// rewrite or keep it without affecting the caller.
    async fn exchange(&self, query: Message) -> Result<Message, DomainError>;

    /// Release connections and sockets held by this upstream.
    async fn close(&self) -> Result<(), DomainError>;

    fn address(&self) -> &str;

    fn tag(&self) -> Option<&str> {
        None
    }
}

/// Construction parameters shared by all upstreams of one forwarder.
#[derive(Clone)]
pub struct UpstreamOptions {
    pub bootstrap: Arc<dyn BootstrapResolver>,
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
    pub tag: Option<Arc<str>>,
    /// Logging identity; every event emitted by the upstream is recorded inside it.
    pub span: Span,
}

impl UpstreamOptions {
    pub fn new(bootstrap: Arc<dyn BootstrapResolver>, timeout: Duration) -> Self {
        Self {
            bootstrap,
            timeout,
            insecure_skip_verify: false,
            tag: None,
            span: Span::none(),
        }
    }

    pub fn with_insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    /// Attach a tag and derive the per-upstream span from it.
    pub fn with_tag(mut self, tag: Option<&str>, addr: &str) -> Self {
        self.tag = tag.map(Arc::from);
        self.span = tracing::info_span!("upstream", tag = tag.unwrap_or(""), addr = %addr);
        self
    }
}

/// Builds an upstream from its address string. Must not perform network I/O.
pub trait UpstreamFactory: Send + Sync {
    fn build(
        &self,
        addr: &str,
        options: UpstreamOptions,
    ) -> Result<Arc<dyn Upstream>, DomainError>;
}
