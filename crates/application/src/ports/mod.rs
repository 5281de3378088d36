mod bootstrap_resolver;
mod exchange_signal;
mod query_forwarder;
mod upstream;

pub use bootstrap_resolver::{BootstrapResolver, HostLookup};
pub use exchange_signal::ExchangeSignal;
pub use query_forwarder::{ExchangeOutcome, QueryForwarder};
pub use upstream::{Upstream, UpstreamFactory, UpstreamOptions};
