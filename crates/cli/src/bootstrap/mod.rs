mod logging;

pub use logging::{init_logging, tracing_level};

use fanout_dns_domain::{CliOverrides, Config};
use tracing::info;

/// Loads and validates the configuration, returning it together with the
/// file it came from (`None` when the defaults were used).
pub fn load_config(
    path: Option<&str>,
    overrides: CliOverrides,
) -> anyhow::Result<(Config, Option<String>)> {
    let config = Config::load(path, overrides)?;
    config.validate()?;

    let source = path.map(str::to_string).or_else(Config::get_config_path);
    Ok((config, source))
}

/// Must run after [`init_logging`].
pub fn log_config_source(source: Option<&str>) {
    match source {
        Some(path) => info!(path, "Configuration loaded"),
        None => info!("No configuration file found, using defaults"),
    }
}
