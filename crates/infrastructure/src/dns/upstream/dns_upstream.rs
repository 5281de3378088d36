use crate::dns::transport::{create_transport, tcp::TcpTransport, Transport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_application::ports::{Upstream, UpstreamFactory, UpstreamOptions};
use fanout_dns_domain::{DnsProtocol, DomainError};
use hickory_proto::op::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument, Span};

/// An upstream DNS server reached over one of the supported transports.
pub struct DnsUpstream {
    address: String,
    protocol: DnsProtocol,
    tag: Option<Arc<str>>,
    transport: Transport,
    /// UDP upstreams retry truncated answers over TCP to the same server.
    tcp_fallback: Option<Transport>,
    timeout: Duration,
    span: Span,
    closed: AtomicBool,
}

impl DnsUpstream {
    /// Parses `addr` and prepares its transport. No packets leave the host
    /// here; names are resolved through `options.bootstrap` at first exchange.
    pub fn new(addr: &str, options: UpstreamOptions) -> Result<Self, DomainError> {
        let protocol: DnsProtocol = addr.parse()?;
        let transport = create_transport(&protocol, &options)?;
        let tcp_fallback = match &protocol {
            DnsProtocol::Udp { addr } => Some(Transport::Tcp(TcpTransport::new(
                addr.clone(),
                options.bootstrap.clone(),
            ))),
            _ => None,
        };

        Ok(Self {
            address: addr.trim().to_string(),
            protocol,
            tag: options.tag,
            transport,
            tcp_fallback,
            timeout: options.timeout,
            span: options.span,
            closed: AtomicBool::new(false),
        })
    }

    pub fn protocol(&self) -> &DnsProtocol {
        &self.protocol
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, transport: &Transport, wire: &[u8]) -> Result<Message, DomainError> {
        let TransportResponse {
            bytes,
            protocol_used,
        } = tokio::time::timeout(self.timeout, transport.send(wire, self.timeout))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.address.clone(),
            })??;

        let response = Message::from_vec(&bytes).map_err(|e| {
            DomainError::InvalidDnsResponse(format!(
                "Failed to parse {} response from {}: {}",
                protocol_used, self.address, e
            ))
        })?;

        Ok(response)
    }

    async fn exchange_inner(&self, mut query: Message) -> Result<Message, DomainError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DomainError::IoError(format!(
                "upstream {} is closed",
                self.address
            )));
        }

        let original_id = query.id();
        if self.transport.requires_zero_id() {
            let mut header = *query.header();
            header.set_id(0);
            query.set_header(header);
        }
        let wire = query.to_vec().map_err(|e| {
            DomainError::InvalidDnsResponse(format!("Failed to encode query: {}", e))
        })?;

        let mut response = self.send(&self.transport, &wire).await?;

        if response.truncated() {
            if let Some(tcp) = &self.tcp_fallback {
                debug!("Truncated UDP response, retrying over TCP");
                response = self.send(tcp, &wire).await?;
            }
        }

        if response.id() != query.id() {
            return Err(DomainError::InvalidDnsResponse(format!(
                "Response ID {} does not match query ID {} from {}",
                response.id(),
                query.id(),
                self.address
            )));
        }

        let mut header = *response.header();
        header.set_id(original_id);
        response.set_header(header);
        debug!(
            answers = response.answers().len(),
            rcode = ?response.response_code(),
            protocol = self.transport.protocol_name(),
            "Upstream answered"
        );

        Ok(response)
    }
}

#[async_trait]
impl Upstream for DnsUpstream {
    async fn exchange(&self, query: Message) -> Result<Message, DomainError> {
        self.exchange_inner(query)
            .instrument(self.span.clone())
            .await
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.closed.store(true, Ordering::Release);
        async {
            let primary = self.transport.close().await;
            let fallback = match &self.tcp_fallback {
                Some(tcp) => tcp.close().await,
                None => Ok(()),
            };
            debug!("Upstream closed");
            primary.and(fallback)
        }
        .instrument(self.span.clone())
        .await
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

/// Builds [`DnsUpstream`]s from address strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportUpstreamFactory;

impl UpstreamFactory for TransportUpstreamFactory {
    fn build(
        &self,
        addr: &str,
        options: UpstreamOptions,
    ) -> Result<Arc<dyn Upstream>, DomainError> {
        Ok(Arc::new(DnsUpstream::new(addr, options)?))
    }
}
