//! Static host table read from the system hosts file.

use async_trait::async_trait;
use fanout_dns_application::ports::{BootstrapResolver, HostLookup};
use fanout_dns_domain::DomainError;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub struct HostsResolver {
    forward: FxHashMap<Box<str>, SmallVec<[IpAddr; 2]>>,
}

impl HostsResolver {
    /// Reads the platform hosts file.
    pub fn from_system() -> Result<Self, DomainError> {
        Self::from_file(system_hosts_path())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DomainError::IoError(format!("Failed to read hosts file {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parses hosts file syntax. Lines that do not start with an IP address
    /// are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut forward: FxHashMap<Box<str>, SmallVec<[IpAddr; 2]>> = FxHashMap::default();

        for line in contents.lines() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            let mut words = line.split_whitespace();
            let Some(ip) = words.next().and_then(|w| w.parse::<IpAddr>().ok()) else {
                continue;
            };

            for name in words {
                let addrs = forward.entry(normalize(name).into()).or_default();
                if !addrs.contains(&ip) {
                    addrs.push(ip);
                }
            }
        }

        Self { forward }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

pub(crate) fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(windows)]
fn system_hosts_path() -> PathBuf {
    let root = std::env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
    PathBuf::from(root).join("System32\\drivers\\etc\\hosts")
}

#[cfg(not(windows))]
fn system_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

#[async_trait]
impl BootstrapResolver for HostsResolver {
    async fn lookup(&self, host: &str) -> Result<HostLookup, DomainError> {
        match self.forward.get(normalize(host).as_str()) {
            Some(addrs) => Ok(HostLookup::new(addrs.to_vec(), None)),
            None => Err(DomainError::HostNotFound(host.to_string())),
        }
    }

    fn name(&self) -> &str {
        "hosts"
    }
}
