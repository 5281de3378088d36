use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exchange deadline applied when the configured timeout is zero.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// One configured upstream server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamSpec {
    /// Attribution label attached to every log line emitted for this upstream.
    #[serde(default)]
    pub tag: Option<String>,

    pub addr: String,
}

impl UpstreamSpec {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            tag: None,
            addr: addr.into(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub upstreams: Vec<UpstreamSpec>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default)]
    pub bootstrap: Vec<String>,

    /// Per-attempt exchange deadline in milliseconds. `0` selects
    /// [`DEFAULT_QUERY_TIMEOUT`].
    #[serde(default)]
    pub timeout_ms: u64,
}

impl ForwarderConfig {
    /// Single-upstream configuration built from a bare address string.
    pub fn quick_setup(addr: impl Into<String>) -> Self {
        Self {
            upstreams: vec![UpstreamSpec::new(addr)],
            ..Self::default()
        }
    }

    pub fn options(&self) -> ForwarderOptions {
        ForwarderOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            insecure_skip_verify: self.insecure_skip_verify,
            bootstrap: self.bootstrap.clone(),
        }
    }
}

/// Options shared by every upstream of one forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderOptions {
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
    pub bootstrap: Vec<String>,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            insecure_skip_verify: false,
            bootstrap: Vec::new(),
        }
    }
}

impl ForwarderOptions {
    /// Timeout with the zero value replaced by [`DEFAULT_QUERY_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_QUERY_TIMEOUT
        } else {
            self.timeout
        }
    }
}
