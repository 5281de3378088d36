use serde::{Deserialize, Serialize};
use std::path::Path;

use super::errors::ConfigError;
use super::forwarder::{ForwarderConfig, UpstreamSpec};
use super::logging::{LogLevel, LoggingConfig};
use super::server::ServerConfig;

const LOCAL_CONFIG_PATH: &str = "fanout-dns.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/fanout-dns/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub forwarder: ForwarderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            forwarder: ForwarderConfig::quick_setup("udp://9.9.9.9:53"),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. fanout-dns.toml in current directory
    /// 3. /etc/fanout-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path.or_else(|| Self::get_config_path_str()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if !overrides.upstreams.is_empty() {
            self.forwarder.upstreams = overrides
                .upstreams
                .into_iter()
                .map(UpstreamSpec::new)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        if self.forwarder.upstreams.is_empty() {
            return Err(ConfigError::Validation(
                "No upstream servers configured".to_string(),
            ));
        }

        if let Some(i) = self
            .forwarder
            .upstreams
            .iter()
            .position(|u| u.addr.trim().is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "Upstream #{} has an empty address",
                i
            )));
        }

        Ok(())
    }

    fn get_config_path_str() -> Option<&'static str> {
        if Path::new(LOCAL_CONFIG_PATH).exists() {
            Some(LOCAL_CONFIG_PATH)
        } else if Path::new(SYSTEM_CONFIG_PATH).exists() {
            Some(SYSTEM_CONFIG_PATH)
        } else {
            None
        }
    }

    /// Get the path to the configuration file being used
    pub fn get_config_path() -> Option<String> {
        Self::get_config_path_str().map(str::to_string)
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<LogLevel>,
    pub upstreams: Vec<String>,
}
