//! LOP Telemetry Ingest - Main Entry Point

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use telemetry_daemon::{init_logging, install_metrics, run, DaemonConfig};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lop-ingest", version, about = "Ingest LOP panel telemetry into SQLite")]
struct Cli {
    /// TOML configuration file; LOP_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref()).context("loading configuration")?;

    init_logging(&config.log)?;
    info!("=== LOP Telemetry Ingest v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = config.metrics_listen {
        install_metrics(addr)?;
    }

    let stats = run(&config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Waiting for Ctrl-C failed: {}", e);
        }
    })
    .await?;

    info!(
        commits = stats.commits,
        rows_inserted = stats.rows_inserted,
        rows_failed = stats.rows_failed,
        "Shutdown complete"
    );
    Ok(())
}
