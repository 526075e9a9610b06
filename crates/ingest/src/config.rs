//! Pipeline tuning

use std::time::Duration;

/// Configuration for producers and the batch writer
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum frames committed per transaction (default: 50)
    pub batch_size: usize,
    /// Bounded channel capacity between producers and writer
    pub queue_capacity: usize,
    /// Producer sleep after an empty or failed read
    pub retry_sleep: Duration,
    /// Extra attempts for an insert that hit a busy/locked database
    pub busy_retries: u8,
    /// Backoff base between busy retries, doubled per attempt
    pub busy_backoff: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            queue_capacity: 1024,
            retry_sleep: Duration::from_millis(10),
            busy_retries: 3,
            busy_backoff: Duration::from_millis(20),
        }
    }
}
