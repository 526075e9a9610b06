//! Request-Response Frame Engine
//!
//! LOP2 panels only answer when asked: every cycle writes the fixed poll
//! command and reads back one 65-byte reply whose last two bytes are a
//! CRC16 over the rest. There is no resynchronization state; a bad reply
//! is logged and the next cycle simply polls again. Input still pending
//! on the line is discarded before every command and after every failed
//! exchange, so a late reply cannot shift the next one.

use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, warn};

use crate::checksum;
use crate::error::ProtocolError;
use crate::frame::{Frame, RawFrame};
use crate::limits::LOP2_FRAME_LEN;

/// Read 30 holding registers from unit 1, CRC included
pub const POLL_COMMAND: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x1E, 0xC5, 0xC2];

/// Default reply timeout
const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Upper bound on reads per drain, for a line that never goes quiet
const MAX_DRAIN_READS: usize = 16;

/// Polling engine for one request-response line
pub struct RequestResponseEngine {
    /// Reply timeout
    timeout: Duration,
    /// Completed polls
    polls: u64,
    /// Replies rejected by CRC
    crc_failures: u64,
}

impl RequestResponseEngine {
    /// Create an engine with the default reply timeout
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            polls: 0,
            crc_failures: 0,
        }
    }

    /// Set reply timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Reply timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of successful polls
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Number of replies rejected by CRC
    pub fn crc_failures(&self) -> u64 {
        self.crc_failures
    }

    /// Send the poll command and read one validated reply
    pub async fn poll<T>(&mut self, port: &mut T) -> Result<RawFrame, ProtocolError>
    where
        T: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let stale = drain_input(port).await?;
        if stale > 0 {
            debug!("Discarded {} stale bytes before poll", stale);
        }

        let result = self.exchange(port).await;
        if let Err(
            ProtocolError::Timeout(_)
            | ProtocolError::ShortRead { .. }
            | ProtocolError::CrcMismatch { .. },
        ) = &result
        {
            match drain_input(port).await {
                Ok(0) => {}
                Ok(n) => debug!("Discarded {} bytes after failed exchange", n),
                Err(e) => warn!("Draining line after failed exchange: {}", e),
            }
        }
        result
    }

    async fn exchange<T>(&mut self, port: &mut T) -> Result<RawFrame, ProtocolError>
    where
        T: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        port.write_all(&POLL_COMMAND).await?;
        port.flush().await?;

        let mut reply = [0u8; LOP2_FRAME_LEN];
        let timeout_ms = self.timeout.as_millis() as u64;
        tokio::time::timeout(self.timeout, read_fixed(port, &mut reply))
            .await
            .map_err(|_| ProtocolError::Timeout(timeout_ms))??;

        if let Some((computed, received)) = checksum::crc16_pair(&reply) {
            if computed != received {
                self.crc_failures += 1;
                warn!("LOP2 reply rejected: CRC {:04X} != {:04X}", computed, received);
                return Err(ProtocolError::CrcMismatch { computed, received });
            }
        }

        self.polls += 1;
        debug!("LOP2 reply accepted ({} polls)", self.polls);
        Ok(RawFrame::Lop2(Frame::new(reply)))
    }
}

impl Default for RequestResponseEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and discard whatever input is ready right now, without waiting.
/// Returns the number of bytes thrown away.
pub(crate) async fn drain_input<R>(reader: &mut R) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut scratch = [0u8; LOP2_FRAME_LEN];
    let mut drained = 0;
    for _ in 0..MAX_DRAIN_READS {
        let ready = poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut scratch);
            match Pin::new(&mut *reader).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(Some(buf.filled().len()))),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Ready(Ok(None)),
            }
        })
        .await?;

        match ready {
            Some(n) if n > 0 => drained += n,
            // nothing pending, or EOF
            _ => break,
        }
    }
    Ok(drained)
}

/// Read exactly `buf.len()` bytes, reporting how many arrived on a short read
async fn read_fixed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut count = 0;
    while count < buf.len() {
        let n = reader.read(&mut buf[count..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortRead {
                expected: buf.len(),
                actual: count,
            });
        }
        count += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameVariant;

    fn reply() -> Vec<u8> {
        let mut bytes = vec![0x01, 0x03, 0x3C];
        bytes.extend((0..60u8).map(|i| i.wrapping_mul(7)));
        checksum::append_crc16(&mut bytes);
        bytes
    }

    #[tokio::test]
    async fn test_poll_valid_reply() {
        let bytes = reply();
        let mut port = tokio_test::io::Builder::new()
            .write(&POLL_COMMAND)
            .read(&bytes[..20])
            .read(&bytes[20..])
            .build();

        let mut engine = RequestResponseEngine::new();
        let frame = engine.poll(&mut port).await.unwrap();
        assert_eq!(frame.variant(), FrameVariant::Lop2);
        assert_eq!(frame.as_bytes(), &bytes[..]);
        assert_eq!(engine.polls(), 1);
    }

    #[tokio::test]
    async fn test_poll_rejects_flipped_crc() {
        let mut bytes = reply();
        bytes[63] ^= 0xFF;
        bytes[64] ^= 0xFF;
        let mut port = tokio_test::io::Builder::new()
            .write(&POLL_COMMAND)
            .read(&bytes)
            .build();

        let mut engine = RequestResponseEngine::new();
        let result = engine.poll(&mut port).await;
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
        assert_eq!(engine.crc_failures(), 1);
        assert_eq!(engine.polls(), 0);
    }

    #[tokio::test]
    async fn test_poll_short_read() {
        let bytes = reply();
        let (mut client, mut panel) = tokio::io::duplex(256);

        let panel_task = tokio::spawn(async move {
            let mut command = [0u8; 8];
            panel.read_exact(&mut command).await.unwrap();
            assert_eq!(command, POLL_COMMAND);
            panel.write_all(&bytes[..40]).await.unwrap();
            // Dropping the panel end closes the stream mid-reply
        });

        let mut engine = RequestResponseEngine::new();
        let result = engine.poll(&mut client).await;
        panel_task.await.unwrap();
        assert!(matches!(
            result,
            Err(ProtocolError::ShortRead { expected: 65, actual: 40 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let (mut client, mut panel) = tokio::io::duplex(256);

        let mut engine = RequestResponseEngine::new();
        engine.set_timeout(Duration::from_millis(200));
        let result = engine.poll(&mut client).await;
        assert!(matches!(result, Err(ProtocolError::Timeout(200))));

        let mut command = [0u8; 8];
        panel.read_exact(&mut command).await.unwrap();
        assert_eq!(command, POLL_COMMAND);
    }
    #[tokio::test(start_paused = true)]
    async fn test_late_reply_does_not_shift_later_polls() {
        let bytes = reply();
        let (mut client, mut panel) = tokio::io::duplex(512);

        let late = bytes.clone();
        let panel_task = tokio::spawn(async move {
            let mut command = [0u8; 8];
            panel.read_exact(&mut command).await.unwrap();
            panel.write_all(&late[..40]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            panel.write_all(&late[40..]).await.unwrap();

            for _ in 0..4 {
                panel.read_exact(&mut command).await.unwrap();
                assert_eq!(command, POLL_COMMAND);
                panel.write_all(&late).await.unwrap();
            }
        });

        let mut engine = RequestResponseEngine::new();
        engine.set_timeout(Duration::from_millis(100));
        let first = engine.poll(&mut client).await;
        assert!(matches!(first, Err(ProtocolError::Timeout(100))));

        // Next poll cycle starts after the tail of the first reply arrived
        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..4 {
            let frame = engine.poll(&mut client).await.unwrap();
            assert_eq!(frame.as_bytes(), &bytes[..]);
        }
        panel_task.await.unwrap();
        assert_eq!(engine.polls(), 4);
        assert_eq!(engine.crc_failures(), 0);
    }

    #[tokio::test]
    async fn test_drain_input_discards_pending_bytes() {
        let (mut client, mut panel) = tokio::io::duplex(256);
        panel.write_all(&[0xAA; 25]).await.unwrap();

        assert_eq!(drain_input(&mut client).await.unwrap(), 25);
        assert_eq!(drain_input(&mut client).await.unwrap(), 0);
    }
}
