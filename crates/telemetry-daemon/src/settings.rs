//! Daemon Configuration
//!
//! Layered with the `config` crate: an optional TOML file, then `LOP_`
//! environment variables (`__` separates nesting, e.g.
//! `LOP_DATABASE__PATH=/tmp/lop.db`).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use frame_protocol::{BaudRate, FrameVariant};
use ingest::IngestConfig;
use serde::Deserialize;
use storage::StoreOptions;

use crate::DaemonError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    pub busy_retries: u8,
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lop1.db"),
            busy_timeout_ms: 1000,
            busy_retries: 3,
            wal: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub retry_sleep_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            queue_capacity: 1024,
            retry_sleep_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// One physical serial line
#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    /// Stored as `device_id` on every row from this line
    pub name: String,
    pub device: String,
    #[serde(default)]
    pub baud: BaudRate,
    pub protocol: FrameVariant,
    /// Poll period, request-response lines only
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_response_timeout_ms() -> u64 {
    1000
}

impl LineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestSettings,
    pub lines: Vec<LineConfig>,
    pub log: LogConfig,
    /// Prometheus scrape listener, disabled when absent
    pub metrics_listen: Option<SocketAddr>,
}

impl DaemonConfig {
    /// Load from an optional file plus the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, DaemonError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("LOP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DaemonConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.lines.is_empty() {
            return Err(DaemonError::Invalid("no lines configured".into()));
        }
        if self.ingest.batch_size == 0 {
            return Err(DaemonError::Invalid("ingest.batch_size must be at least 1".into()));
        }
        if self.ingest.queue_capacity == 0 {
            return Err(DaemonError::Invalid("ingest.queue_capacity must be at least 1".into()));
        }

        let mut names = HashSet::new();
        let mut devices = HashSet::new();
        for line in &self.lines {
            if !names.insert(line.name.as_str()) {
                return Err(DaemonError::Invalid(format!("duplicate line name {}", line.name)));
            }
            if !devices.insert(line.device.as_str()) {
                return Err(DaemonError::Invalid(format!("device {} used twice", line.device)));
            }
            if !line.protocol.is_continuous() && line.poll_interval_ms == 0 {
                return Err(DaemonError::Invalid(format!(
                    "line {}: poll_interval_ms must be positive",
                    line.name
                )));
            }
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            path: self.database.path.clone(),
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            wal: self.database.wal,
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            batch_size: self.ingest.batch_size,
            queue_capacity: self.ingest.queue_capacity,
            retry_sleep: Duration::from_millis(self.ingest.retry_sleep_ms),
            busy_retries: self.database.busy_retries,
            ..IngestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<DaemonConfig, DaemonError> {
        let config: DaemonConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_example_file_parses() {
        let config = parse(include_str!("../lop-ingest.toml")).unwrap();
        assert_eq!(config.lines.len(), 3);
        assert_eq!(config.lines[2].protocol, FrameVariant::Lop2);
        assert_eq!(config.lines[2].poll_interval(), Duration::from_millis(500));
        assert_eq!(config.lines[0].baud, BaudRate::B9600);
        assert_eq!(config.ingest_config().batch_size, 50);
        assert_eq!(config.store_options().busy_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse(
            r#"
            [[lines]]
            name = "engine"
            device = "/dev/ttyUSB0"
            protocol = "lop1_frame1"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("lop1.db"));
        assert_eq!(config.lines[0].baud, BaudRate::B9600);
        assert_eq!(config.log.level, "info");
        assert!(config.metrics_listen.is_none());
    }

    #[test]
    fn test_unsupported_baud_rejected() {
        let result = parse(
            r#"
            [[lines]]
            name = "engine"
            device = "/dev/ttyUSB0"
            baud = 19200
            protocol = "lop1_frame1"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let result = parse(
            r#"
            [[lines]]
            name = "engine"
            device = "/dev/ttyUSB0"
            protocol = "lop3"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = parse(
            r#"
            [[lines]]
            name = "engine"
            device = "/dev/ttyUSB0"
            protocol = "lop1_frame1"

            [[lines]]
            name = "engine"
            device = "/dev/ttyUSB1"
            protocol = "lop1_frame2"
            "#,
        );
        assert!(matches!(result, Err(DaemonError::Invalid(_))));
    }

    #[test]
    fn test_no_lines_rejected() {
        assert!(matches!(parse(""), Err(DaemonError::Invalid(_))));
    }
}
