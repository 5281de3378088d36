pub mod errors;
pub mod forwarder;
pub mod logging;
pub mod root;
pub mod server;

pub use errors::ConfigError;
pub use forwarder::{ForwarderConfig, ForwarderOptions, UpstreamSpec, DEFAULT_QUERY_TIMEOUT};
pub use logging::{LogLevel, LoggingConfig};
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
