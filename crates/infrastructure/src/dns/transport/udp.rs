//! UDP Transport for DNS queries (RFC 1035 §4.2.1)
//!
//! Standard DNS transport. Messages are sent as-is (no framing).
//! If the response has the TC (truncated) bit set, the caller should retry via TCP.

use super::resolver::resolve_targets;
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::{DomainError, UpstreamAddr};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Largest datagram a UDP socket can deliver. Queries are forwarded with the
/// client's EDNS buffer size, so an answer may use all of it.
const MAX_UDP_RESPONSE_SIZE: usize = 65535;

/// DNS over UDP transport
pub struct UdpTransport {
    upstream_addr: UpstreamAddr,
    bootstrap: Arc<dyn BootstrapResolver>,
}

impl UdpTransport {
    pub fn new(upstream_addr: UpstreamAddr, bootstrap: Arc<dyn BootstrapResolver>) -> Self {
        Self {
            upstream_addr,
            bootstrap,
        }
    }

    fn bind_addr_for(server_addr: &SocketAddr) -> SocketAddr {
        if server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        }
    }
}

/// Datagrams whose ID differs from the query's are stray answers to an
/// earlier query on a reused port.
fn same_message_id(query: &[u8], response: &[u8]) -> bool {
    query.len() >= 2 && response.len() >= 2 && query[..2] == response[..2]
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let deadline = Instant::now() + timeout;
        let targets =
            resolve_targets(&self.upstream_addr, self.bootstrap.as_ref(), timeout).await?;
        let server_addr = targets[0];

        let socket = UdpSocket::bind(Self::bind_addr_for(&server_addr))
            .await
            .map_err(|e| DomainError::IoError(format!("Failed to bind UDP socket: {}", e)))?;

        // Connected sockets drop datagrams from any other source.
        socket.connect(server_addr).await.map_err(|e| {
            DomainError::IoError(format!("Failed to connect UDP socket to {}: {}", server_addr, e))
        })?;

        let bytes_sent = tokio::time::timeout_at(deadline, socket.send(message_bytes))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server_addr.to_string(),
            })?
            .map_err(|e| {
                DomainError::IoError(format!("Failed to send UDP query to {}: {}", server_addr, e))
            })?;

        debug!(server = %server_addr, bytes_sent, "UDP query sent");

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let bytes_received = tokio::time::timeout_at(deadline, socket.recv(&mut recv_buf))
                .await
                .map_err(|_| DomainError::TransportTimeout {
                    server: server_addr.to_string(),
                })?
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        DomainError::TransportConnectionRefused {
                            server: server_addr.to_string(),
                        }
                    }
                    _ => DomainError::IoError(format!(
                        "Failed to receive UDP response from {}: {}",
                        server_addr, e
                    )),
                })?;

            if !same_message_id(message_bytes, &recv_buf[..bytes_received]) {
                warn!(server = %server_addr, "Discarding UDP response with mismatched ID");
                continue;
            }

            recv_buf.truncate(bytes_received);
            debug!(server = %server_addr, bytes_received, "UDP response received");

            return Ok(TransportResponse {
                bytes: bytes::Bytes::from(recv_buf),
                protocol_used: "UDP",
            });
        }
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}
