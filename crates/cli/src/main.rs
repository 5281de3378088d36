use clap::Parser;
use fanout_dns_application::ports::QueryForwarder;
use fanout_dns_application::use_cases::ForwardQueryUseCase;
use fanout_dns_domain::{CliOverrides, LogLevel};
use fanout_dns_infrastructure::dns::Forwarder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod bootstrap;
mod server;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "fanout-dns")]
#[command(version)]
#[command(about = "Fanout DNS - races every query across all upstreams")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// DNS server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Upstream address, repeatable. Replaces the configured upstreams.
    #[arg(short = 'u', long = "upstream", value_name = "ADDR")]
    upstreams: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level,
        upstreams: cli.upstreams.clone(),
    };

    let (config, config_source) = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config);
    bootstrap::log_config_source(config_source.as_deref());

    info!("Starting Fanout DNS v{}", env!("CARGO_PKG_VERSION"));

    let forwarder = Arc::new(Forwarder::from_config(&config.forwarder).await?);
    let query_timeout = forwarder.timeout();
    for upstream in forwarder.upstreams() {
        info!(
            addr = upstream.address(),
            tag = upstream.tag().unwrap_or(""),
            "Upstream configured"
        );
    }

    let use_case = Arc::new(ForwardQueryUseCase::new(
        Arc::clone(&forwarder) as Arc<dyn QueryForwarder>
    ));

    let bind_addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.dns_port).parse()?;
    let shutdown = CancellationToken::new();

    let mut server = tokio::spawn(server::start_dns_server(
        bind_addr,
        use_case,
        query_timeout,
        shutdown.clone(),
    ));

    let joined = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            shutdown.cancel();
            server.await
        }
        joined = &mut server => joined,
    };

    let outcome = match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("DNS server task failed: {}", e)),
    };
    if let Err(e) = &outcome {
        error!(error = %e, "DNS server error");
    }

    if let Err(e) = forwarder.close().await {
        warn!(error = %e, "Failed to close upstreams cleanly");
    }

    info!("Server shutdown complete");
    outcome
}
