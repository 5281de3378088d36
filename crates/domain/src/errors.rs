use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One failed attempt inside an aggregate error, attributed to the upstream
/// (or bootstrap resolver) that produced it.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub index: usize,
    pub upstream: Arc<str>,
    pub error: Box<DomainError>,
}

impl AttemptFailure {
    pub fn new(index: usize, upstream: impl Into<Arc<str>>, error: DomainError) -> Self {
        Self {
            index,
            upstream: upstream.into(),
            error: Box::new(error),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.upstream, self.error)
    }
}

fn join_failures(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No upstream is configured")]
    NoUpstreamConfigured,

    #[error("Failed to init upstream #{index} ({addr}): {reason}")]
    UpstreamInit {
        index: usize,
        addr: String,
        reason: String,
    },

    #[error("Failed to init bootstrap resolver #{index} ({addr}): {reason}")]
    Bootstrap {
        index: usize,
        addr: String,
        reason: String,
    },

    #[error("Invalid upstream address: {0}")]
    InvalidUpstreamAddress(String),

    #[error("Exchange cancelled")]
    Cancelled,

    #[error("Exchange deadline exceeded")]
    DeadlineExceeded,

    #[error("All {} upstreams failed: {}", .0.len(), join_failures(.0))]
    AllUpstreamsFailed(Vec<AttemptFailure>),

    #[error("All {} bootstrap resolvers failed: {}", .0.len(), join_failures(.0))]
    AllResolversFailed(Vec<AttemptFailure>),

    #[error("Failed to close {} upstreams: {}", .0.len(), join_failures(.0))]
    Close(Vec<AttemptFailure>),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Transport timeout connecting to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// `true` when the exchange stopped because the caller's signal fired,
    /// as opposed to every upstream failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. }
                | Self::TransportConnectionRefused { .. }
                | Self::IoError(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HostNotFound(_))
    }

    /// Per-attempt failures carried by an aggregate error, empty otherwise.
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            Self::AllUpstreamsFailed(f) | Self::AllResolversFailed(f) | Self::Close(f) => f,
            _ => &[],
        }
    }
}
