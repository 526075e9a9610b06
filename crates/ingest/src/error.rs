use frame_protocol::ProtocolError;
use storage::StorageError;
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Frame queue closed")]
    QueueClosed,
}
