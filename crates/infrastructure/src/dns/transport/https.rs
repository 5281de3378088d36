//! HTTPS Transport for DNS queries, DNS-over-HTTPS (RFC 8484)
//!
//! Sends DNS queries as HTTP POST requests with `application/dns-message` content type.
//! The request body is the raw DNS wire format message, and the response body
//! contains the raw DNS wire format response.
//!
//! Requires the `dns-over-https` feature flag.
//!
//! Wire format (HTTP):
//! ```text
//! POST /dns-query HTTP/2
//! Content-Type: application/dns-message
//! Accept: application/dns-message
//!
//! <raw DNS message bytes>
//! ```

use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::DomainError;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Expected content type for DNS-over-HTTPS responses (RFC 8484 §4.2.1)
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

const MAX_IDLE_PER_HOST: usize = 4;

/// Lets reqwest resolve the DoH server name through the bootstrap resolver
/// instead of the system one.
struct BootstrapDns {
    bootstrap: Arc<dyn BootstrapResolver>,
}

impl Resolve for BootstrapDns {
    fn resolve(&self, name: Name) -> Resolving {
        let bootstrap = Arc::clone(&self.bootstrap);
        Box::pin(async move {
            let lookup = bootstrap.lookup(name.as_str()).await?;
            let addrs: Addrs = Box::new(
                lookup
                    .addresses
                    .iter()
                    .map(|ip| SocketAddr::new(*ip, 0))
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

/// DNS-over-HTTPS transport (RFC 8484)
pub struct HttpsTransport {
    url: String,
    client: Mutex<Option<reqwest::Client>>,
    timeout: Duration,
    insecure_skip_verify: bool,
    bootstrap: Arc<dyn BootstrapResolver>,
}

impl HttpsTransport {
    pub fn new(
        url: &str,
        bootstrap: Arc<dyn BootstrapResolver>,
        timeout: Duration,
        insecure_skip_verify: bool,
    ) -> Result<Self, DomainError> {
        let client = Self::build_client(&bootstrap, timeout, insecure_skip_verify)?;
        Ok(Self {
            url: url.to_string(),
            client: Mutex::new(Some(client)),
            timeout,
            insecure_skip_verify,
            bootstrap,
        })
    }

    fn build_client(
        bootstrap: &Arc<dyn BootstrapResolver>,
        timeout: Duration,
        insecure_skip_verify: bool,
    ) -> Result<reqwest::Client, DomainError> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .http2_prior_knowledge()
            .danger_accept_invalid_certs(insecure_skip_verify)
            .dns_resolver(Arc::new(BootstrapDns {
                bootstrap: Arc::clone(bootstrap),
            }))
            .build()
            .map_err(|e| DomainError::Configuration(format!("Failed to build DoH client: {}", e)))
    }

    /// Current client, recreated when a previous `close` dropped the pool.
    fn client(&self) -> Result<reqwest::Client, DomainError> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Self::build_client(&self.bootstrap, self.timeout, self.insecure_skip_verify)?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        debug!(
            url = %self.url,
            message_len = message_bytes.len(),
            "Sending DoH query"
        );

        let client = self.client()?;

        // POST with application/dns-message (RFC 8484 §4.1)
        let response = tokio::time::timeout(
            timeout,
            client
                .post(&self.url)
                .header("Content-Type", DNS_MESSAGE_CONTENT_TYPE)
                .header("Accept", DNS_MESSAGE_CONTENT_TYPE)
                .body(message_bytes.to_vec())
                .send(),
        )
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: self.url.clone(),
        })?
        .map_err(|e| DomainError::IoError(format!("DoH request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::InvalidDnsResponse(format!(
                "DoH server {} returned HTTP {}: {}",
                self.url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let response_bytes = tokio::time::timeout(timeout, response.bytes())
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.url.clone(),
            })?
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to read DoH response from {}: {}",
                    self.url, e
                ))
            })?;

        debug!(
            url = %self.url,
            response_len = response_bytes.len(),
            "DoH response received"
        );

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "HTTPS",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }

    async fn close(&self) -> Result<(), DomainError> {
        // Idle connections close once the last clone of the client is gone.
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(url = %self.url, "DoH client released");
        Ok(())
    }
}
