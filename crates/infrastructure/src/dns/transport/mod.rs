#[cfg(feature = "dns-over-https")]
pub mod https;
#[cfg(feature = "dns-over-quic")]
pub mod quic;
pub mod resolver;
pub mod tcp;
#[cfg(feature = "dns-over-rustls")]
pub mod tls;
#[cfg(any(feature = "dns-over-rustls", feature = "dns-over-quic"))]
pub mod tls_config;
pub mod udp;

use async_trait::async_trait;
use fanout_dns_application::ports::UpstreamOptions;
use fanout_dns_domain::{DnsProtocol, DomainError};
use std::time::Duration;

pub use resolver::{resolve_targets, DialTargets};

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: bytes::Bytes,

    pub protocol_used: &'static str,
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;

    fn protocol_name(&self) -> &'static str;

    /// Releases pooled connections. Later sends dial again.
    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
    #[cfg(feature = "dns-over-rustls")]
    Tls(tls::TlsTransport),
    #[cfg(feature = "dns-over-https")]
    Https(https::HttpsTransport),
    #[cfg(feature = "dns-over-quic")]
    Quic(quic::QuicTransport),
}

impl Transport {
    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tcp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => DnsTransport::send(t, message_bytes, timeout).await,
        }
    }

    pub async fn close(&self) -> Result<(), DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::close(t).await,
            Self::Tcp(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => DnsTransport::close(t).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(_) => "TLS",
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => "HTTPS",
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => "QUIC",
        }
    }

    /// DoH and DoQ send every query with message ID 0 (RFC 8484 §4.1, RFC 9250 §4.2.1).
    pub fn requires_zero_id(&self) -> bool {
        match self {
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => true,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => true,
            _ => false,
        }
    }
}

/// Builds the transport for `protocol`. Performs no network I/O: hostnames
/// are resolved through the bootstrap resolver on first use.
pub fn create_transport(
    protocol: &DnsProtocol,
    options: &UpstreamOptions,
) -> Result<Transport, DomainError> {
    let bootstrap = options.bootstrap.clone();

    match protocol {
        DnsProtocol::Udp { addr } => Ok(Transport::Udp(udp::UdpTransport::new(
            addr.clone(),
            bootstrap,
        ))),
        DnsProtocol::Tcp { addr } => Ok(Transport::Tcp(tcp::TcpTransport::new(
            addr.clone(),
            bootstrap,
        ))),

        #[cfg(feature = "dns-over-rustls")]
        DnsProtocol::Tls { addr, server_name } => Ok(Transport::Tls(tls::TlsTransport::new(
            addr.clone(),
            server_name,
            bootstrap,
            options.insecure_skip_verify,
        )?)),

        #[cfg(not(feature = "dns-over-rustls"))]
        DnsProtocol::Tls { .. } => Err(DomainError::InvalidUpstreamAddress(format!(
            "TLS feature not enabled. Enable 'dns-over-rustls' feature to use: {}",
            protocol
        ))),

        #[cfg(feature = "dns-over-https")]
        DnsProtocol::Https { url, .. } => Ok(Transport::Https(https::HttpsTransport::new(
            url,
            bootstrap,
            options.timeout,
            options.insecure_skip_verify,
        )?)),

        #[cfg(not(feature = "dns-over-https"))]
        DnsProtocol::Https { url, .. } => Err(DomainError::InvalidUpstreamAddress(format!(
            "HTTPS feature not enabled. Enable 'dns-over-https' feature to use: {}",
            url
        ))),

        #[cfg(feature = "dns-over-quic")]
        DnsProtocol::Quic { addr, server_name } => Ok(Transport::Quic(quic::QuicTransport::new(
            addr.clone(),
            server_name.clone(),
            bootstrap,
            options.insecure_skip_verify,
        )?)),

        #[cfg(not(feature = "dns-over-quic"))]
        DnsProtocol::Quic { .. } => Err(DomainError::InvalidUpstreamAddress(format!(
            "QUIC feature not enabled. Enable 'dns-over-quic' feature to use: {}",
            protocol
        ))),
    }
}
