//! Fanout DNS Infrastructure Layer
pub mod dns;
