use crate::errors::DomainError;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_TLS_PORT: u16 = 853;
pub const DEFAULT_QUIC_PORT: u16 = 853;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Represents an upstream server address that may or may not be resolved to an IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamAddr {
    Resolved(SocketAddr),
    Unresolved { hostname: Arc<str>, port: u16 },
}

impl UpstreamAddr {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            UpstreamAddr::Resolved(addr) => Some(*addr),
            UpstreamAddr::Unresolved { .. } => None,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            UpstreamAddr::Resolved(addr) => addr.port(),
            UpstreamAddr::Unresolved { port, .. } => *port,
        }
    }

    /// Host part as written: the IP literal for resolved addresses, the
    /// hostname otherwise. Used as the TLS server name.
    pub fn host(&self) -> String {
        match self {
            UpstreamAddr::Resolved(addr) => addr.ip().to_string(),
            UpstreamAddr::Unresolved { hostname, .. } => hostname.to_string(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, UpstreamAddr::Unresolved { .. })
    }

}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamAddr::Resolved(addr) => write!(f, "{}", addr),
            UpstreamAddr::Unresolved { hostname, port } => write!(f, "{}:{}", hostname, port),
        }
    }
}

/// Transport and target of one upstream, parsed from its address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    Udp {
        addr: UpstreamAddr,
    },
    Tcp {
        addr: UpstreamAddr,
    },
    Tls {
        addr: UpstreamAddr,
        server_name: Arc<str>,
    },
    Https {
        url: Arc<str>,
        addr: UpstreamAddr,
    },
    Quic {
        addr: UpstreamAddr,
        server_name: Arc<str>,
    },
}

impl DnsProtocol {
    pub fn addr(&self) -> &UpstreamAddr {
        match self {
            DnsProtocol::Udp { addr }
            | DnsProtocol::Tcp { addr }
            | DnsProtocol::Tls { addr, .. }
            | DnsProtocol::Https { addr, .. }
            | DnsProtocol::Quic { addr, .. } => addr,
        }
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr().socket_addr()
    }

    pub fn server_name(&self) -> Option<&str> {
        match self {
            DnsProtocol::Tls { server_name, .. } | DnsProtocol::Quic { server_name, .. } => {
                Some(server_name)
            }
            DnsProtocol::Https { addr, .. } => match addr {
                UpstreamAddr::Unresolved { hostname, .. } => Some(hostname),
                UpstreamAddr::Resolved(_) => None,
            },
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            DnsProtocol::Https { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            DnsProtocol::Udp { .. } => "UDP",
            DnsProtocol::Tcp { .. } => "TCP",
            DnsProtocol::Tls { .. } => "TLS",
            DnsProtocol::Https { .. } => "HTTPS",
            DnsProtocol::Quic { .. } => "QUIC",
        }
    }

    /// Returns `true` if the host is a name that must go through a bootstrap resolver.
    pub fn needs_resolution(&self) -> bool {
        self.addr().is_unresolved()
    }
}

fn invalid(s: &str, reason: &str) -> DomainError {
    DomainError::InvalidUpstreamAddress(format!("'{}': {}", s, reason))
}

fn parse_host_port(s: &str) -> Option<(&str, Option<&str>)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Some((host, None));
        }
        return Some((host, Some(tail.strip_prefix(':')?)));
    }
    match s.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 literal.
        Some((host, _)) if host.contains(':') => Some((s, None)),
        Some((host, port)) => Some((host, Some(port))),
        None => Some((s, None)),
    }
}

fn parse_upstream_addr(s: &str, default_port: u16) -> Result<UpstreamAddr, DomainError> {
    if s.is_empty() {
        return Err(invalid(s, "missing host"));
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(UpstreamAddr::Resolved(addr));
    }

    let (host, port) = parse_host_port(s).ok_or_else(|| invalid(s, "malformed host"))?;
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| invalid(s, &format!("invalid port: {}", e)))?,
        None => default_port,
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(UpstreamAddr::Resolved(SocketAddr::new(ip, port)));
    }

    let valid_hostname = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
    if !valid_hostname {
        return Err(invalid(s, "invalid hostname"));
    }

    Ok(UpstreamAddr::Unresolved {
        hostname: host.trim_end_matches('.').into(),
        port,
    })
}

impl FromStr for DnsProtocol {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("udp".to_string(), s),
        };

        match scheme.as_str() {
            "udp" | "tcp" | "tls" | "quic" | "doq" if rest.contains('/') => {
                Err(invalid(s, "unexpected path"))
            }
            "udp" => Ok(DnsProtocol::Udp {
                addr: parse_upstream_addr(rest, DEFAULT_DNS_PORT)?,
            }),
            "tcp" => Ok(DnsProtocol::Tcp {
                addr: parse_upstream_addr(rest, DEFAULT_DNS_PORT)?,
            }),
            "tls" => {
                let addr = parse_upstream_addr(rest, DEFAULT_TLS_PORT)?;
                let server_name = addr.host().into();
                Ok(DnsProtocol::Tls { addr, server_name })
            }
            "quic" | "doq" => {
                let addr = parse_upstream_addr(rest, DEFAULT_QUIC_PORT)?;
                let server_name = addr.host().into();
                Ok(DnsProtocol::Quic { addr, server_name })
            }
            "https" => {
                let authority = rest.split(['/', '?']).next().unwrap_or(rest);
                let addr = parse_upstream_addr(authority, DEFAULT_HTTPS_PORT)?;
                let url: Arc<str> = if rest.len() == authority.len() {
                    format!("https://{}/dns-query", authority).into()
                } else {
                    format!("https://{}", rest).into()
                };
                Ok(DnsProtocol::Https { url, addr })
            }
            other => Err(invalid(s, &format!("unsupported scheme '{}'", other))),
        }
    }
}

impl fmt::Display for DnsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsProtocol::Udp { addr } => write!(f, "udp://{}", addr),
            DnsProtocol::Tcp { addr } => write!(f, "tcp://{}", addr),
            DnsProtocol::Tls { addr, .. } => write!(f, "tls://{}", addr),
            DnsProtocol::Https { url, .. } => write!(f, "{}", url),
            DnsProtocol::Quic { addr, .. } => write!(f, "quic://{}", addr),
        }
    }
}
