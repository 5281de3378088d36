use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::DomainError;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct MockResolver {
    name: String,
    result: Result<HostLookup, DomainError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn resolving(name: &str, ips: &[IpAddr], ttl: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            result: Ok(HostLookup::new(ips.to_vec(), ttl)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, error: DomainError) -> Self {
        Self {
            name: name.to_string(),
            result: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::failing(name, DomainError::HostNotFound("mock".to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BootstrapResolver for MockResolver {
    async fn lookup(&self, _host: &str) -> Result<HostLookup, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
