//! LOP Panel Framing
//!
//! Serial framing for marine engine local operating panels. Two wire
//! families are supported:
//!
//! * the continuous LOP1 stream, where `FA F5`-marked frames arrive
//!   unsolicited and must be resynchronized out of a noisy byte stream;
//! * the LOP2 request-response exchange, a fixed command answered by a
//!   fixed-length reply protected by CRC16.

pub mod checksum;
mod error;
mod frame;
mod line;
mod poller;
mod sync;

pub use error::ProtocolError;
pub use frame::{Frame, FrameVariant, RawFrame, MARKER};
pub use line::{open_line, BaudRate, SerialLine};
pub use poller::{RequestResponseEngine, POLL_COMMAND};
pub use sync::{ContinuousSynchronizer, RollingBuffer, SyncStats};

/// Framing constants
pub mod limits {
    /// Minimum number of buffered bytes a marker candidate needs before it is examined
    pub const MIN_FRAME: usize = 7;
    /// Rolling buffer capacity per continuous line
    pub const BUFFER_CAPACITY: usize = 128;
    /// Bytes kept after a fruitless scan of an over-half-full buffer
    pub const TRIM_KEEP: usize = 4;
    /// LOP1 primary frame length (length field 0x0023)
    pub const LOP1_FRAME1_LEN: usize = 35;
    /// LOP1 secondary frame length (length field 0x0020)
    pub const LOP1_FRAME2_LEN: usize = 32;
    /// LOP2 reply length: header(3) + 60 data bytes + CRC(2)
    pub const LOP2_FRAME_LEN: usize = 65;
}
