//! TLS Transport for DNS queries, DNS-over-TLS (RFC 7858)
//!
//! Each upstream builds its `ClientConfig` once and keeps a small pool of
//! idle TLS connections. rustls resumes sessions on reconnect.

use super::tcp::{connect_any, read_with_length_prefix, send_with_length_prefix, IdlePool};
use super::tls_config::{client_config, TLS_ALL_VERSIONS};
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::{DomainError, UpstreamAddr};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// DNS-over-TLS transport (RFC 7858)
pub struct TlsTransport {
    upstream_addr: UpstreamAddr,
    server_name: ServerName<'static>,
    bootstrap: Arc<dyn BootstrapResolver>,
    connector: TlsConnector,
    pool: IdlePool<TlsStream<TcpStream>>,
}

impl TlsTransport {
    pub fn new(
        upstream_addr: UpstreamAddr,
        server_name: &str,
        bootstrap: Arc<dyn BootstrapResolver>,
        insecure_skip_verify: bool,
    ) -> Result<Self, DomainError> {
        let server_name = ServerName::try_from(server_name.to_string()).map_err(|e| {
            DomainError::InvalidUpstreamAddress(format!(
                "Invalid TLS server name '{}': {}",
                server_name, e
            ))
        })?;
        let config = client_config(insecure_skip_verify, TLS_ALL_VERSIONS, &[])?;

        Ok(Self {
            upstream_addr,
            server_name,
            bootstrap,
            connector: TlsConnector::from(Arc::new(config)),
            pool: IdlePool::new(),
        })
    }

    /// Establish a new TLS connection (TCP connect + TLS handshake).
    async fn connect_new(&self, timeout: Duration) -> Result<TlsStream<TcpStream>, DomainError> {
        let tcp_stream = connect_any(&self.upstream_addr, self.bootstrap.as_ref(), timeout).await?;

        let tls_stream = tokio::time::timeout(
            timeout,
            self.connector.connect(self.server_name.clone(), tcp_stream),
        )
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: self.upstream_addr.to_string(),
        })?
        .map_err(|e| DomainError::TransportConnectionRefused {
            server: format!("{} (TLS handshake): {}", self.upstream_addr, e),
        })?;

        debug!(server = %self.upstream_addr, "TLS connection established");
        Ok(tls_stream)
    }

    async fn send_on_stream(
        &self,
        stream: &mut TlsStream<TcpStream>,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        tokio::time::timeout(timeout, async {
            send_with_length_prefix(stream, message_bytes).await?;
            read_with_length_prefix(stream).await
        })
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: self.upstream_addr.to_string(),
        })?
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(mut stream) = self.pool.take() {
            match self
                .send_on_stream(&mut stream, message_bytes, timeout)
                .await
            {
                Ok(response_bytes) => {
                    debug!(server = %self.upstream_addr, "TLS query via pooled connection");
                    self.pool.put(stream);
                    return Ok(TransportResponse {
                        bytes: bytes::Bytes::from(response_bytes),
                        protocol_used: "TLS",
                    });
                }
                Err(_) => {
                    debug!(
                        server = %self.upstream_addr,
                        "Pooled TLS connection stale, reconnecting"
                    );
                }
            }
        }

        let mut stream = self.connect_new(timeout).await?;
        let response_bytes = self
            .send_on_stream(&mut stream, message_bytes, timeout)
            .await?;

        debug!(
            server = %self.upstream_addr,
            response_len = response_bytes.len(),
            "TLS response received"
        );

        self.pool.put(stream);

        Ok(TransportResponse {
            bytes: bytes::Bytes::from(response_bytes),
            protocol_used: "TLS",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }

    async fn close(&self) -> Result<(), DomainError> {
        let closed = self.pool.drain();
        debug!(server = %self.upstream_addr, closed, "TLS pool drained");
        Ok(())
    }
}
