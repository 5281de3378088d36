//! QUIC Transport for DNS queries, DNS-over-QUIC (RFC 9250)
//!
//! One bidirectional stream per query on a connection that is kept open and
//! reused. The endpoint and connection belong to the upstream and are torn
//! down by `close`.

use super::resolver::resolve_targets;
use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::tls_config::{client_config, TLS13_ONLY};
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::{DomainError, UpstreamAddr};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const DOQ_ALPN: &[u8] = b"doq";
const DOQ_NO_ERROR: u32 = 0;

pub struct QuicTransport {
    upstream_addr: UpstreamAddr,
    server_name: Arc<str>,
    bootstrap: Arc<dyn BootstrapResolver>,
    client_config: quinn::ClientConfig,
    endpoint: Mutex<Option<quinn::Endpoint>>,
    connection: Mutex<Option<quinn::Connection>>,
}

impl QuicTransport {
    pub fn new(
        upstream_addr: UpstreamAddr,
        server_name: Arc<str>,
        bootstrap: Arc<dyn BootstrapResolver>,
        insecure_skip_verify: bool,
    ) -> Result<Self, DomainError> {
        let mut tls_config = client_config(insecure_skip_verify, TLS13_ONLY, &[DOQ_ALPN])?;
        tls_config.resumption = rustls::client::Resumption::in_memory_sessions(64);
        let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(Arc::new(tls_config))
            .map_err(|e| {
                DomainError::Configuration(format!("Invalid QUIC TLS configuration: {}", e))
            })?;

        Ok(Self {
            upstream_addr,
            server_name,
            bootstrap,
            client_config: quinn::ClientConfig::new(Arc::new(quic_config)),
            endpoint: Mutex::new(None),
            connection: Mutex::new(None),
        })
    }

    /// Endpoint bound to the address family of `server_addr`, created on first use.
    fn endpoint_for(&self, server_addr: &SocketAddr) -> Result<quinn::Endpoint, DomainError> {
        let mut guard = self.endpoint.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(endpoint) = guard.as_ref() {
            let same_family = endpoint
                .local_addr()
                .map(|local| local.is_ipv4() == server_addr.is_ipv4())
                .unwrap_or(false);
            if same_family {
                return Ok(endpoint.clone());
            }
        }

        let bind_addr = if server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let mut endpoint = quinn::Endpoint::client(bind_addr).map_err(|e| {
            DomainError::IoError(format!("Failed to bind QUIC endpoint: {}", e))
        })?;
        endpoint.set_default_client_config(self.client_config.clone());

        *guard = Some(endpoint.clone());
        Ok(endpoint)
    }

    fn cached_connection(&self) -> Option<quinn::Connection> {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) if conn.close_reason().is_none() => Some(conn.clone()),
            Some(_) => {
                guard.take();
                None
            }
            None => None,
        }
    }

    fn forget_connection(&self) {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn connect_new(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let targets =
            resolve_targets(&self.upstream_addr, self.bootstrap.as_ref(), timeout).await?;
        let server_addr = targets[0];
        let endpoint = self.endpoint_for(&server_addr)?;

        let connecting = endpoint
            .connect(server_addr, &self.server_name)
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to initiate QUIC connection to {}: {}",
                    server_addr, e
                ))
            })?;

        let conn = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server_addr.to_string(),
            })?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}({}): {}", self.server_name, server_addr, e),
            })?;

        debug!(
            server = %server_addr,
            server_name = %self.server_name,
            "QUIC connection established"
        );
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(conn.clone());
        Ok(conn)
    }

    async fn send_on_stream(
        &self,
        conn: &quinn::Connection,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let deadline = Instant::now() + timeout;
        let server = self.upstream_addr.to_string();

        let (mut send_stream, mut recv_stream) = tokio::time::timeout_at(deadline, conn.open_bi())
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.clone(),
            })?
            .map_err(|e| {
                DomainError::IoError(format!("Failed to open QUIC stream to {}: {}", server, e))
            })?;

        tokio::time::timeout_at(
            deadline,
            send_with_length_prefix(&mut send_stream, message_bytes),
        )
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: server.clone(),
        })??;

        send_stream.finish().map_err(|e| {
            DomainError::IoError(format!(
                "Failed to finish QUIC send stream to {}: {}",
                server, e
            ))
        })?;

        tokio::time::timeout_at(deadline, read_with_length_prefix(&mut recv_stream))
            .await
            .map_err(|_| DomainError::TransportTimeout { server })?
    }
}

#[async_trait]
impl DnsTransport for QuicTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(conn) = self.cached_connection() {
            match self.send_on_stream(&conn, message_bytes, timeout).await {
                Ok(response_bytes) => {
                    debug!(server = %self.upstream_addr, "QUIC query via pooled connection");
                    return Ok(TransportResponse {
                        bytes: bytes::Bytes::from(response_bytes),
                        protocol_used: "QUIC",
                    });
                }
                Err(e) => {
                    self.forget_connection();
                    debug!(
                        server = %self.upstream_addr,
                        error = %e,
                        "QUIC connection stale, reconnecting"
                    );
                }
            }
        }

        let conn = self.connect_new(timeout).await?;
        let response_bytes = self.send_on_stream(&conn, message_bytes, timeout).await?;

        debug!(
            server = %self.upstream_addr,
            response_len = response_bytes.len(),
            "QUIC response received"
        );

        Ok(TransportResponse {
            bytes: bytes::Bytes::from(response_bytes),
            protocol_used: "QUIC",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "QUIC"
    }

    async fn close(&self) -> Result<(), DomainError> {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            conn.close(DOQ_NO_ERROR.into(), b"closing");
        }

        let endpoint = self
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(endpoint) = endpoint {
            endpoint.close(DOQ_NO_ERROR.into(), b"closing");
        }

        debug!(server = %self.upstream_addr, "QUIC endpoint closed");
        Ok(())
    }
}
