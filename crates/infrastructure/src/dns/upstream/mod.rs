mod dns_upstream;

pub use dns_upstream::{DnsUpstream, TransportUpstreamFactory};
