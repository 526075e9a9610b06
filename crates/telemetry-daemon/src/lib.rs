//! LOP Telemetry Daemon
//!
//! Wires configured serial lines into the ingestion pipeline and owns the
//! process-wide concerns: configuration, logging, metrics export and
//! graceful shutdown.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod settings;
mod pipeline;

pub use settings::{DaemonConfig, DatabaseConfig, IngestSettings, LineConfig, LogConfig};
pub use pipeline::{run, Pipeline};

/// Startup errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("Metrics exporter failed: {0}")]
    Metrics(String),
    #[error("Line {line} unavailable: {source}")]
    Line {
        line: String,
        source: frame_protocol::ProtocolError,
    },
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Initialize logging
pub fn init_logging(log: &LogConfig) -> Result<(), DaemonError> {
    let level: Level = log
        .level
        .parse()
        .map_err(|_| DaemonError::Invalid(format!("unknown log level {}", log.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| DaemonError::Logging(e.to_string()))
}

/// Start the Prometheus scrape endpoint
pub fn install_metrics(addr: SocketAddr) -> Result<(), DaemonError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DaemonError::Metrics(e.to_string()))?;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
