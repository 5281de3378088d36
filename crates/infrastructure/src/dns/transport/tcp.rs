use super::resolver::resolve_targets;
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::BootstrapResolver;
use fanout_dns_domain::{DomainError, UpstreamAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_IDLE_PER_UPSTREAM: usize = 2;

/// Idle connections owned by a single upstream.
pub(crate) struct IdlePool<S> {
    idle: Mutex<Vec<S>>,
    closed: AtomicBool,
}

impl<S> IdlePool<S> {
    pub(crate) fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(MAX_IDLE_PER_UPSTREAM)),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn take(&self) -> Option<S> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    /// Keeps `stream` for reuse unless the pool is full or was drained.
    pub(crate) fn put(&self, stream: S) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_PER_UPSTREAM {
            idle.push(stream);
        }
    }

    /// Drops every idle connection; returns how many were closed.
    pub(crate) fn drain(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let count = idle.len();
        idle.clear();
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct TcpTransport {
    upstream_addr: UpstreamAddr,
    bootstrap: Arc<dyn BootstrapResolver>,
    pool: IdlePool<TcpStream>,
}

impl TcpTransport {
    pub fn new(upstream_addr: UpstreamAddr, bootstrap: Arc<dyn BootstrapResolver>) -> Self {
        Self {
            upstream_addr,
            bootstrap,
            pool: IdlePool::new(),
        }
    }

    async fn connect_new(&self, timeout: Duration) -> Result<TcpStream, DomainError> {
        connect_any(&self.upstream_addr, self.bootstrap.as_ref(), timeout).await
    }

    async fn exchange_on(
        &self,
        stream: &mut TcpStream,
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

/// Opens a TCP connection to the first reachable address of `upstream_addr`.
pub(crate) async fn connect_any(
    upstream_addr: &UpstreamAddr,
    bootstrap: &dyn BootstrapResolver,
    timeout: Duration,
) -> Result<TcpStream, DomainError> {
    let targets = resolve_targets(upstream_addr, bootstrap, timeout).await?;
    let mut last_error = None;

    for server_addr in targets {
        match tokio::time::timeout(timeout, TcpStream::connect(server_addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).map_err(|e| {
                    DomainError::IoError(format!(
                        "Failed to set TCP_NODELAY on {}: {}",
                        server_addr, e
                    ))
                })?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(server = %server_addr, error = %e, "TCP connect failed");
                last_error = Some(DomainError::TransportConnectionRefused {
                    server: format!("{}: {}", server_addr, e),
                });
            }
            Err(_) => {
                last_error = Some(DomainError::TransportTimeout {
                    server: server_addr.to_string(),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DomainError::HostNotFound(upstream_addr.to_string())))
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(mut stream) = self.pool.take() {
            match self.exchange_on(&mut stream, message_bytes, timeout).await {
                Ok(response_bytes) => {
                    debug!(server = %self.upstream_addr, "TCP query via pooled connection");
                    self.pool.put(stream);
                    return Ok(TransportResponse {
                        bytes: bytes::Bytes::from(response_bytes),
                        protocol_used: "TCP",
                    });
                }
                Err(e) => {
                    debug!(
                        server = %self.upstream_addr,
                        error = %e,
                        "Pooled TCP connection stale, reconnecting"
                    );
                }
            }
        }

        let mut stream = self.connect_new(timeout).await?;
        let response_bytes = self.exchange_on(&mut stream, message_bytes, timeout).await?;

        debug!(
            server = %self.upstream_addr,
            response_len = response_bytes.len(),
            "TCP response received"
        );

        self.pool.put(stream);

        Ok(TransportResponse {
            bytes: bytes::Bytes::from(response_bytes),
            protocol_used: "TCP",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }

    async fn close(&self) -> Result<(), DomainError> {
        let closed = self.pool.drain();
        debug!(server = %self.upstream_addr, closed, "TCP pool drained");
        Ok(())
    }
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> Result<(), DomainError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        DomainError::IoError(format!(
            "DNS message too large for TCP framing: {} bytes",
            message_bytes.len()
        ))
    })?;

    stream
        .write_all(&length.to_be_bytes())
        .await
        .map_err(|e| DomainError::IoError(format!("Failed to write length prefix: {}", e)))?;
    stream
        .write_all(message_bytes)
        .await
        .map_err(|e| DomainError::IoError(format!("Failed to write DNS message: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| DomainError::IoError(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(stream: &mut S) -> Result<Vec<u8>, DomainError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DomainError::IoError(format!("Failed to read response length: {}", e)))?;

    let mut response = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| DomainError::IoError(format!("Failed to read response body: {}", e)))?;

    Ok(response)
}
