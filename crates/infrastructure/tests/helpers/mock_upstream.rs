use async_trait::async_trait;
use fanout_dns_application::ports::{Upstream, UpstreamFactory, UpstreamOptions};
use fanout_dns_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ANSWER_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Answer(Duration),
    Fail(Duration),
    Hang,
}

pub struct MockUpstream {
    address: String,
    behavior: Behavior,
    mutate_query: bool,
    close_fails: bool,
    exchanges: AtomicUsize,
    completed: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    closes: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockUpstream {
    pub fn new(address: &str, behavior: Behavior) -> Self {
        Self {
            address: address.to_string(),
            behavior,
            mutate_query: false,
            close_fails: false,
            exchanges: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn answering(address: &str, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(address, Behavior::Answer(Duration::from_millis(delay_ms))))
    }

    pub fn failing(address: &str, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(address, Behavior::Fail(Duration::from_millis(delay_ms))))
    }

    pub fn hanging(address: &str) -> Arc<Self> {
        Arc::new(Self::new(address, Behavior::Hang))
    }

    /// Rewrites the query it receives before answering.
    pub fn mutating(mut self) -> Self {
        self.mutate_query = true;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn response_for(&self, query: &Message) -> Message {
        let mut response = Message::new(query.id(), MessageType::Response, OpCode::Query);
        for q in query.queries() {
            response.add_query(q.clone());
            response.add_answer(Record::from_rdata(
                q.name().clone(),
                60,
                RData::A(A(ANSWER_IP)),
            ));
        }
        response
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn exchange(&self, mut query: Message) -> Result<Message, DomainError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight);

        if self.mutate_query {
            let mut header = *query.header();
            header.set_id(query.id().wrapping_add(1));
            query.set_header(header);
            query.set_recursion_desired(false);
        }

        let result = match self.behavior {
            Behavior::Answer(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.response_for(&query))
            }
            Behavior::Fail(delay) => {
                tokio::time::sleep(delay).await;
                Err(DomainError::TransportConnectionRefused {
                    server: self.address.clone(),
                })
            }
            Behavior::Hang => std::future::pending().await,
        };

        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            Err(DomainError::IoError(format!("{} refused to close", self.address)))
        } else {
            Ok(())
        }
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Hands out prepared upstreams in order and records the options it saw.
pub struct MockFactory {
    upstreams: Vec<Arc<MockUpstream>>,
    fail_at: Option<usize>,
    calls: AtomicUsize,
    options: Mutex<Vec<UpstreamOptions>>,
}

impl MockFactory {
    pub fn new(upstreams: Vec<Arc<MockUpstream>>) -> Self {
        Self {
            upstreams,
            fail_at: None,
            calls: AtomicUsize::new(0),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Vec<UpstreamOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl UpstreamFactory for MockFactory {
    fn build(
        &self,
        addr: &str,
        options: UpstreamOptions,
    ) -> Result<Arc<dyn Upstream>, DomainError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options);

        if self.fail_at == Some(index) {
            return Err(DomainError::InvalidUpstreamAddress(addr.to_string()));
        }

        let upstream = match self.upstreams.get(index) {
            Some(upstream) => Arc::clone(upstream),
            None => MockUpstream::answering(addr, 0),
        };
        Ok(upstream as Arc<dyn Upstream>)
    }
}
