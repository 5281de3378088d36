pub mod mock_forwarder;

pub use mock_forwarder::{query_for, response_for, MockForwarder, StaticUpstream};
