//! Framing and transport error types

use thiserror::Error;

use crate::frame::FrameVariant;

/// Errors raised by serial lines and frame engines
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serial port open, configure, read or write failure
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Baud rate outside the supported set
    #[error("Unsupported baud rate {0} (supported: 4800, 9600, 57600, 115200)")]
    UnsupportedBaud(u32),

    /// Unknown line protocol name in configuration
    #[error("Unknown frame variant: {0}")]
    UnknownVariant(String),

    /// A continuous synchronizer was requested for a polled variant
    #[error("Frame variant {0} is not a continuous stream")]
    NotContinuous(FrameVariant),

    /// Timeout waiting for a polled reply
    #[error("Timeout waiting for reply after {0}ms")]
    Timeout(u64),

    /// The line stopped delivering bytes before a full reply arrived
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// CRC16 mismatch on a polled reply
    #[error("CRC mismatch: computed {computed:04X}, received {received:04X}")]
    CrcMismatch { computed: u16, received: u16 },
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ProtocolError {
    fn from(err: tokio_serial::Error) -> Self {
        ProtocolError::SerialError(err.to_string())
    }
}
