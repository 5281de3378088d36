#![allow(dead_code)]
pub mod dns_server_mock;
pub mod mock_resolver;
pub mod mock_upstream;

pub use dns_server_mock::{MockDnsServer, ServerBehavior};
pub use mock_resolver::MockResolver;
pub use mock_upstream::{Behavior, MockFactory, MockUpstream};

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::str::FromStr;

pub fn query_for(domain: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(0x4f2a, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(domain).unwrap(), record_type));
    message
}
