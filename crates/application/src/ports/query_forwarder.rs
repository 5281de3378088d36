use super::{ExchangeSignal, Upstream};
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use hickory_proto::op::Message;
use std::fmt;
use std::sync::Arc;

/// Winning response of one exchange and the upstream that produced it.
#[derive(Clone)]
pub struct ExchangeOutcome {
    pub response: Message,
    pub upstream: Arc<dyn Upstream>,
    pub latency_ms: u64,
}

impl fmt::Debug for ExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeOutcome")
            .field("id", &self.response.id())
            .field("answers", &self.response.answers().len())
            .field("upstream", &self.upstream.address())
            .field("latency_ms", &self.latency_ms)
            .finish()
    }
}

#[async_trait]
pub trait QueryForwarder: Send + Sync {
    /// Forward `query` and return the first successful response, or the reason
    /// none arrived before `signal` fired.
    async fn exchange(
        &self,
        query: &Message,
        signal: &ExchangeSignal,
    ) -> Result<ExchangeOutcome, DomainError>;

    async fn close(&self) -> Result<(), DomainError>;
}
