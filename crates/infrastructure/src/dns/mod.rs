pub mod bootstrap;
pub mod forwarder;
pub mod transport;
pub mod upstream;

pub use bootstrap::{build_bootstrap, BootstrapOptions};
pub use forwarder::Forwarder;
pub use upstream::{DnsUpstream, TransportUpstreamFactory};
