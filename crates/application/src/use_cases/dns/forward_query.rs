use crate::ports::{ExchangeSignal, QueryForwarder};
use fanout_dns_domain::DomainError;
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Per-query state handed through the execution pipeline.
pub struct QueryContext {
    query: Message,
    response: Option<Message>,
    signal: ExchangeSignal,
    answered_by: Option<Arc<str>>,
}

impl QueryContext {
    pub fn new(query: Message, signal: ExchangeSignal) -> Self {
        Self {
            query,
            response: None,
            signal,
            answered_by: None,
        }
    }

    pub fn query(&self) -> &Message {
        &self.query
    }

    pub fn response(&self) -> Option<&Message> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: Message) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<Message> {
        self.response.take()
    }

    pub fn signal(&self) -> &ExchangeSignal {
        &self.signal
    }

    /// Address of the upstream whose response is stored, if any.
    pub fn answered_by(&self) -> Option<&str> {
        self.answered_by.as_deref()
    }
}

pub struct ForwardQueryUseCase {
    forwarder: Arc<dyn QueryForwarder>,
}

impl ForwardQueryUseCase {
    pub fn new(forwarder: Arc<dyn QueryForwarder>) -> Self {
        Self { forwarder }
    }

    /// Forward the context's query and store the winning response in it.
    /// On error the response slot is left untouched.
    pub async fn execute(&self, ctx: &mut QueryContext) -> Result<(), DomainError> {
        let start = Instant::now();

        let outcome = match self.forwarder.exchange(&ctx.query, &ctx.signal).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Forwarding failed"
                );
                return Err(e);
            }
        };

        debug!(
            upstream = %outcome.upstream.address(),
            latency_ms = outcome.latency_ms,
            answers = outcome.response.answers().len(),
            "Query forwarded"
        );

        ctx.answered_by = Some(Arc::from(outcome.upstream.address()));
        ctx.set_response(outcome.response);
        Ok(())
    }
}
