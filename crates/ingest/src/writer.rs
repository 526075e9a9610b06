//! Batch Writer
//!
//! The single consumer of the frame channel. It blocks for one task, then
//! takes whatever else is already queued up to `batch_size`, and writes the
//! batch inside one transaction. A row that fails to insert is logged and
//! left out; the rest of the batch still commits.

use std::time::Duration;

use frame_decoder::{decode_at, Measurement};
use metrics::{counter, histogram};
use storage::{FrameStore, FrameTransaction, StorageError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::task::FrameTask;
use crate::IngestError;

/// Writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Committed transactions
    pub commits: u64,
    /// Rows made durable
    pub rows_inserted: u64,
    /// Rows dropped (insert failure or failed commit)
    pub rows_failed: u64,
}

/// Wait for one task, then drain ready tasks without waiting until `max`
/// are collected. `None` once every sender is gone and the queue is empty.
pub async fn next_batch(rx: &mut mpsc::Receiver<FrameTask>, max: usize) -> Option<Vec<FrameTask>> {
    let first = rx.recv().await?;
    let mut batch = Vec::with_capacity(max.max(1));
    batch.push(first);
    while batch.len() < max {
        match rx.try_recv() {
            Ok(task) => batch.push(task),
            Err(_) => break,
        }
    }
    Some(batch)
}

/// Insert, retrying while the database reports busy/locked
async fn insert_with_retry(
    tx: &mut FrameTransaction<'_>,
    line: &str,
    measurement: &Measurement,
    retries: u8,
    backoff: Duration,
) -> Result<i64, StorageError> {
    let mut attempt = 0u8;
    loop {
        match tx.insert(line, measurement).await {
            Err(e) if e.is_busy() && attempt < retries => {
                attempt += 1;
                let delay = backoff * (1u32 << (attempt - 1).min(8));
                warn!(line, attempt, "Database busy, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Single consumer that owns the writer connection
pub struct BatchWriter {
    store: FrameStore,
    config: IngestConfig,
    stats: BatchStats,
}

impl BatchWriter {
    pub fn new(store: FrameStore, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            stats: BatchStats::default(),
        }
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Drain the channel until every producer has hung up
    pub async fn run(mut self, mut rx: mpsc::Receiver<FrameTask>) -> BatchStats {
        info!(batch_size = self.config.batch_size, "Batch writer started");

        while let Some(batch) = next_batch(&mut rx, self.config.batch_size).await {
            if let Err(e) = self.write_batch(batch).await {
                error!("Batch lost: {}", e);
            }
        }

        if let Err(e) = self.store.close().await {
            warn!("Closing frame store failed: {}", e);
        }
        info!(
            commits = self.stats.commits,
            rows_inserted = self.stats.rows_inserted,
            rows_failed = self.stats.rows_failed,
            "Batch writer stopped"
        );
        self.stats
    }

    /// Decode and insert one batch under a single transaction.
    /// Returns the number of rows committed.
    pub async fn write_batch(&mut self, batch: Vec<FrameTask>) -> Result<usize, IngestError> {
        let size = batch.len();
        histogram!("batch_size").record(size as f64);

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                self.stats.rows_failed += size as u64;
                return Err(e.into());
            }
        };

        let mut inserted = Vec::with_capacity(size);
        for task in batch {
            let variant = task.variant();
            let measurement = decode_at(task.frame, task.received_at);
            match insert_with_retry(
                &mut tx,
                &task.line,
                &measurement,
                self.config.busy_retries,
                self.config.busy_backoff,
            )
            .await
            {
                Ok(id) => {
                    debug!(line = %task.line, %variant, id, rpm = measurement.rpm(), "Row inserted");
                    inserted.push(variant);
                }
                Err(e) => {
                    error!(line = %task.line, %variant, "Insert failed, row dropped: {}", e);
                    counter!(
                        "rows_failed_total",
                        "variant" => variant.as_str(),
                        "busy" => if e.is_busy() { "true" } else { "false" }
                    )
                    .increment(1);
                    self.stats.rows_failed += 1;
                }
            }
        }

        if let Err(e) = tx.commit().await {
            self.stats.rows_failed += inserted.len() as u64;
            return Err(e.into());
        }

        self.stats.commits += 1;
        self.stats.rows_inserted += inserted.len() as u64;
        counter!("batch_commits_total").increment(1);
        for variant in &inserted {
            counter!("rows_inserted_total", "variant" => variant.as_str()).increment(1);
        }
        debug!(rows = inserted.len(), of = size, "Batch committed");

        Ok(inserted.len())
    }
}
