//! Frame Ingestion Pipeline
//!
//! One producer task per physical line feeds a bounded channel; a single
//! [`BatchWriter`] drains it in batches of up to `batch_size` frames, each
//! committed as one storage transaction. All tasks observe a shared
//! [`ShutdownSignal`] and the writer drains whatever is queued before it
//! returns.

mod config;
mod error;
mod producer;
mod shutdown;
mod task;
mod writer;

pub use config::IngestConfig;
pub use error::IngestError;
pub use producer::{ContinuousProducer, PollingProducer};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use task::FrameTask;
pub use writer::{next_batch, BatchStats, BatchWriter};
