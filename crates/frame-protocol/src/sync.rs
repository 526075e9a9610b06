//! Continuous Frame Synchronizer
//!
//! LOP1 panels stream frames back to back with no framing guarantees from
//! the UART: reads may split a frame anywhere, and line noise can inject
//! bytes that look like a marker. Each line owns one synchronizer, which
//! keeps a bounded rolling buffer and rescans it for
//! `FA F5 <len:u16 BE> ... <checksum>` after every read.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::checksum;
use crate::error::ProtocolError;
use crate::frame::{FrameVariant, RawFrame, MARKER};
use crate::limits::{BUFFER_CAPACITY, MIN_FRAME, TRIM_KEEP};

/// Fixed-capacity byte buffer owned by a single synchronizer
pub struct RollingBuffer {
    bytes: [u8; BUFFER_CAPACITY],
    len: usize,
}

impl RollingBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            bytes: [0; BUFFER_CAPACITY],
            len: 0,
        }
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        BUFFER_CAPACITY
    }

    /// Buffered bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Free space at the tail, for reads
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.len..]
    }

    /// Mark `n` bytes written into [`spare_mut`](Self::spare_mut) as buffered
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(BUFFER_CAPACITY);
    }

    /// Append as much of `data` as fits, returning the number of bytes taken
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(BUFFER_CAPACITY - self.len);
        self.bytes[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// Drop the first `n` bytes, shifting the rest to the front
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.bytes.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept per synchronizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frames extracted
    pub frames: u64,
    /// Candidates rejected by the checksum
    pub checksum_failures: u64,
    /// Bytes discarded while resynchronizing
    pub bytes_discarded: u64,
}

enum Scan {
    Frame { start: usize },
    Partial { start: usize },
    Nothing,
}

/// Marker/length/checksum synchronizer for one continuous line
pub struct ContinuousSynchronizer {
    variant: FrameVariant,
    buffer: RollingBuffer,
    /// Last extraction produced a frame; more may already be buffered
    rescan: bool,
    stats: SyncStats,
}

impl ContinuousSynchronizer {
    /// Create a synchronizer for a continuous variant
    pub fn new(variant: FrameVariant) -> Result<Self, ProtocolError> {
        if !variant.is_continuous() {
            return Err(ProtocolError::NotContinuous(variant));
        }
        Ok(Self {
            variant,
            buffer: RollingBuffer::new(),
            rescan: false,
            stats: SyncStats::default(),
        })
    }

    /// Variant this synchronizer accepts
    pub fn variant(&self) -> FrameVariant {
        self.variant
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extraction counters
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Read whatever the line has and try to extract one frame.
    ///
    /// `Ok(None)` means no complete frame yet (including a zero-byte read);
    /// the caller should back off briefly and call again.
    pub async fn receive<R>(&mut self, reader: &mut R) -> Result<Option<RawFrame>, ProtocolError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.rescan {
            if let Some(frame) = self.extract() {
                return Ok(Some(frame));
            }
        }

        let spare = self.buffer.spare_mut();
        if !spare.is_empty() {
            let n = reader.read(spare).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.commit(n);
            trace!("{}: read {} bytes, {} buffered", self.variant, n, self.buffer.len());
        }

        Ok(self.extract())
    }

    /// Append bytes obtained elsewhere (replays, tests). Returns how many fit.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        self.buffer.extend(bytes)
    }

    /// Scan the buffer and pull out the first valid frame, if any
    pub fn extract(&mut self) -> Option<RawFrame> {
        match self.scan() {
            Scan::Frame { start } => {
                let end = start + self.variant.frame_len();
                let frame = RawFrame::from_bytes(self.variant, &self.buffer.as_slice()[start..end]);
                self.discard(start);
                self.buffer.consume(end - start);
                self.stats.frames += 1;
                self.rescan = true;
                frame
            }
            Scan::Partial { start } => {
                // Keep the partial frame at the head until the rest arrives
                self.discard(start);
                self.rescan = false;
                None
            }
            Scan::Nothing => {
                self.rescan = false;
                self.trim();
                None
            }
        }
    }

    fn scan(&mut self) -> Scan {
        let expected = self.variant.frame_len();
        let data = self.buffer.as_slice();

        let mut i = 0;
        while i + MIN_FRAME <= data.len() {
            if data[i..i + 2] == MARKER {
                let declared = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
                if declared != expected {
                    trace!("{}: length {} at offset {} rejected", self.variant, declared, i);
                } else if data.len() - i < declared {
                    return Scan::Partial { start: i };
                } else if checksum::verify_sum8(&data[i..i + declared]) {
                    return Scan::Frame { start: i };
                } else {
                    debug!("{}: checksum mismatch at offset {}, resyncing", self.variant, i);
                    self.stats.checksum_failures += 1;
                }
            }
            // Always resume at the next byte, never past the candidate
            i += 1;
        }

        Scan::Nothing
    }

    /// Bound the buffer after a fruitless scan of an over-half-full buffer
    fn trim(&mut self) {
        let len = self.buffer.len();
        if len <= BUFFER_CAPACITY / 2 {
            return;
        }

        // The last MIN_FRAME - 1 bytes were not scanned and may begin a header
        let data = self.buffer.as_slice();
        let unscanned = len.saturating_sub(MIN_FRAME - 1);
        let keep = (unscanned..len - 1)
            .find(|&i| data[i..i + 2] == MARKER)
            .map_or(TRIM_KEEP, |i| (len - i).max(TRIM_KEEP));

        debug!("{}: no frame in {} bytes, keeping last {}", self.variant, len, keep);
        self.discard(len - keep);
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buffer.consume(n);
            self.stats.bytes_discarded += n as u64;
        }
    }
}
