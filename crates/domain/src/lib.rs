//! Fanout DNS Domain Layer
pub mod config;
pub mod dns_protocol;
pub mod errors;

pub use config::{
    CliOverrides, Config, ConfigError, ForwarderConfig, ForwarderOptions, LogLevel,
    LoggingConfig, ServerConfig, UpstreamSpec, DEFAULT_QUERY_TIMEOUT,
};
pub use dns_protocol::{DnsProtocol, UpstreamAddr};
pub use errors::{AttemptFailure, DomainError};
