#![allow(dead_code)]

use async_trait::async_trait;
use fanout_dns_application::ports::{ExchangeOutcome, ExchangeSignal, QueryForwarder, Upstream};
use fanout_dns_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn query_for(domain: &str) -> Message {
    let mut message = Message::new(0x2a2a, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(
        Name::from_str(domain).unwrap(),
        RecordType::A,
    ));
    message
}

pub fn response_for(query: &Message) -> Message {
    let mut response = query.clone();
    let mut header = *response.header();
    header.set_message_type(MessageType::Response);
    response.set_header(header);
    response
}

pub struct StaticUpstream {
    address: String,
}

impl StaticUpstream {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
        })
    }
}

#[async_trait]
impl Upstream for StaticUpstream {
    async fn exchange(&self, query: Message) -> Result<Message, DomainError> {
        Ok(response_for(&query))
    }

    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn address(&self) -> &str {
        &self.address
    }
}

enum Behavior {
    Answer,
    Fail(DomainError),
    WaitForSignal,
}

pub struct MockForwarder {
    behavior: Mutex<Behavior>,
    upstream: Arc<StaticUpstream>,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl MockForwarder {
    pub fn answering() -> Arc<Self> {
        Self::with(Behavior::Answer)
    }

    pub fn failing(error: DomainError) -> Arc<Self> {
        Self::with(Behavior::Fail(error))
    }

    pub fn hanging() -> Arc<Self> {
        Self::with(Behavior::WaitForSignal)
    }

    fn with(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            upstream: StaticUpstream::new("udp://192.0.2.53:53"),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryForwarder for MockForwarder {
    async fn exchange(
        &self,
        query: &Message,
        signal: &ExchangeSignal,
    ) -> Result<ExchangeOutcome, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failure = match &*self.behavior.lock().unwrap() {
            Behavior::Answer => None,
            Behavior::Fail(e) => Some(Some(e.clone())),
            Behavior::WaitForSignal => Some(None),
        };

        match failure {
            None => Ok(ExchangeOutcome {
                response: response_for(query),
                upstream: self.upstream.clone(),
                latency_ms: 3,
            }),
            Some(Some(e)) => Err(e),
            Some(None) => {
                tokio::select! {
                    e = signal.fired() => Err(e),
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => {
                        Err(DomainError::Internal("signal never fired".into()))
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
