use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sonos_dashboard::{DashboardConfig, SonosService};
use sonos_topology::logging::{init_logging, init_logging_from_env, LoggingMode};

/// Household dashboard API over a node-sonos-http-api provider
#[derive(Debug, Parser)]
#[command(name = "sonos-dashboard", version, about)]
struct Args {
    /// Address the HTTP API listens on
    #[arg(long, env = "SONOS_DASHBOARD_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Provider base URL, overrides SONOS_API_URL
    #[arg(long)]
    provider_url: Option<String>,

    /// Seconds between topology polls, overrides SONOS_POLL_INTERVAL
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Never start the companion provider
    #[arg(long)]
    no_companion: bool,

    /// silent, development or debug; defaults to SONOS_LOG_MODE
    #[arg(long)]
    log_mode: Option<LoggingMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.log_mode {
        Some(mode) => init_logging(mode)?,
        None => init_logging_from_env()?,
    }

    tracing::info!("Starting sonos-dashboard v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DashboardConfig::from_env().context("invalid environment configuration")?;
    if let Some(url) = args.provider_url {
        config = config.with_provider_url(url);
    }
    if let Some(secs) = args.poll_interval {
        config = config.with_poll_interval(Duration::from_secs(secs));
    }
    if args.no_companion {
        config = config.with_auto_start_companion(false);
    }
    config.validate()?;

    let service = Arc::new(SonosService::new(config)?);

    let starting = service.clone();
    tokio::task::spawn_blocking(move || starting.start())
        .await
        .context("service start task failed")??;

    let (addr, server) = dashboard_server::bind(service.clone(), args.bind, dashboard_server::shutdown_signal())
        .with_context(|| format!("cannot listen on {}", args.bind))?;
    tracing::info!("Dashboard API listening on http://{}", addr);

    server.await;

    let stopping = service.clone();
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("service stop task failed")??;

    Ok(())
}
