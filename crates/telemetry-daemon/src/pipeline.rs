//! Pipeline wiring: one producer task per line, one writer task

use std::future::Future;

use frame_protocol::{open_line, ProtocolError};
use ingest::{
    shutdown_channel, BatchStats, BatchWriter, ContinuousProducer, FrameTask, IngestConfig,
    PollingProducer, ShutdownSignal, ShutdownTrigger,
};
use storage::FrameStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::settings::{DaemonConfig, LineConfig};
use crate::DaemonError;

/// Running producers and writer
pub struct Pipeline {
    config: IngestConfig,
    tx: mpsc::Sender<FrameTask>,
    trigger: ShutdownTrigger,
    signal: ShutdownSignal,
    producers: Vec<(String, JoinHandle<()>)>,
    writer: JoinHandle<BatchStats>,
}

impl Pipeline {
    /// Spawn the batch writer over `store`
    pub fn start(store: FrameStore, config: IngestConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (trigger, signal) = shutdown_channel();
        let writer = tokio::spawn(BatchWriter::new(store, config.clone()).run(rx));

        Self {
            config,
            tx,
            trigger,
            signal,
            producers: Vec::new(),
            writer,
        }
    }

    /// Spawn the producer for one line over an already opened port
    pub fn attach<P>(&mut self, line: &LineConfig, port: P) -> Result<(), ProtocolError>
    where
        P: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        let signal = self.signal.clone();

        let handle = if line.protocol.is_continuous() {
            let producer = ContinuousProducer::new(
                line.name.as_str(),
                line.protocol,
                self.config.retry_sleep,
            )?;
            tokio::spawn(async move {
                producer.run(port, tx, signal).await;
            })
        } else {
            let producer = PollingProducer::new(
                line.name.as_str(),
                line.poll_interval(),
                line.response_timeout(),
            );
            tokio::spawn(async move {
                producer.run(port, tx, signal).await;
            })
        };

        info!(line = %line.name, protocol = %line.protocol, "Line attached");
        self.producers.push((line.name.clone(), handle));
        Ok(())
    }

    /// Stop producers, then let the writer drain the queue and finish
    pub async fn shutdown(self) -> BatchStats {
        info!("Shutting down {} producers", self.producers.len());
        self.trigger.trigger();
        drop(self.tx);

        for (name, handle) in self.producers {
            if let Err(e) = handle.await {
                error!(line = %name, "Producer task failed: {}", e);
            }
        }

        match self.writer.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Writer task failed: {}", e);
                BatchStats::default()
            }
        }
    }
}

/// Open every line and the store, ingest until `shutdown` resolves
pub async fn run<F>(config: &DaemonConfig, shutdown: F) -> Result<BatchStats, DaemonError>
where
    F: Future<Output = ()>,
{
    // Lines first: a missing device must fail before anything is spawned
    let mut ports = Vec::with_capacity(config.lines.len());
    for line in &config.lines {
        let port = open_line(&line.device, line.baud).map_err(|source| DaemonError::Line {
            line: line.name.clone(),
            source,
        })?;
        ports.push(port);
    }

    let mut store = FrameStore::open(&config.store_options()).await?;
    store.bootstrap().await?;

    let mut pipeline = Pipeline::start(store, config.ingest_config());
    for (line, port) in config.lines.iter().zip(ports) {
        if let Err(source) = pipeline.attach(line, port) {
            pipeline.shutdown().await;
            return Err(DaemonError::Line {
                line: line.name.clone(),
                source,
            });
        }
    }

    info!("Ingesting from {} lines", config.lines.len());
    shutdown.await;

    Ok(pipeline.shutdown().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_protocol::checksum::seal_sum8;
    use frame_protocol::{BaudRate, FrameVariant};
    use std::time::Duration;
    use storage::{QueryService, StoreOptions};
    use tokio::io::AsyncWriteExt;

    fn line(name: &str, protocol: FrameVariant) -> LineConfig {
        LineConfig {
            name: name.to_string(),
            device: format!("/dev/null/{}", name),
            baud: BaudRate::B9600,
            protocol,
            poll_interval_ms: 500,
            response_timeout_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_frames_flow_from_line_to_table() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            path: dir.path().join("lop.db"),
            ..StoreOptions::default()
        };
        let mut store = FrameStore::open(&options).await.unwrap();
        store.bootstrap().await.unwrap();

        let mut pipeline = Pipeline::start(store, IngestConfig::default());
        let (mut panel, port) = tokio::io::duplex(256);
        pipeline
            .attach(&line("engine", FrameVariant::Lop1Frame1), port)
            .unwrap();

        let mut frame = vec![0u8; 35];
        frame[..4].copy_from_slice(&[0xFA, 0xF5, 0x00, 0x23]);
        frame[5..7].copy_from_slice(&1450u16.to_be_bytes());
        seal_sum8(&mut frame);
        panel.write_all(&frame).await.unwrap();

        let service = QueryService::connect(&options.path, Duration::from_secs(1))
            .await
            .unwrap();
        let request = serde_json::json!({ "table": "lop1_frame1", "fields": ["device_id", "rpm"] });
        let mut data = Vec::new();
        for _ in 0..200 {
            data = service.handle_realtime(request.clone()).await.data.unwrap_or_default();
            if !data.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(data, vec![vec![serde_json::json!("engine"), serde_json::json!(1450)]]);

        let stats = pipeline.shutdown().await;
        assert_eq!(stats.rows_inserted, 1);
        assert_eq!(stats.rows_failed, 0);
    }

    #[tokio::test]
    async fn test_missing_device_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::default();
        config.database.path = dir.path().join("lop.db");
        config.lines.push(line("engine", FrameVariant::Lop1Frame1));

        let result = run(&config, async {}).await;
        assert!(matches!(result, Err(DaemonError::Line { .. })));
        assert!(!config.database.path.exists());
    }
}
