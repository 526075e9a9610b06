//! Line Producers
//!
//! One producer owns one physical line and the framing state for it. The
//! continuous producer drives a [`ContinuousSynchronizer`] over an
//! unsolicited byte stream; the polling producer issues the fixed command
//! on an interval through a [`RequestResponseEngine`].

use std::sync::Arc;
use std::time::Duration;

use frame_protocol::{
    ContinuousSynchronizer, FrameVariant, ProtocolError, RawFrame, RequestResponseEngine, SyncStats,
};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;
use crate::task::FrameTask;

/// Hand a frame to the writer; `false` once the pipeline is going away
async fn forward(
    line: &Arc<str>,
    frame: RawFrame,
    tx: &mpsc::Sender<FrameTask>,
    shutdown: &mut ShutdownSignal,
) -> bool {
    let variant = frame.variant();
    counter!("frames_received_total", "variant" => variant.as_str()).increment(1);
    debug!(line = %line, %variant, "Frame received");

    tokio::select! {
        biased;
        _ = shutdown.triggered() => false,
        sent = tx.send(FrameTask::new(line.clone(), frame)) => sent.is_ok(),
    }
}

fn rejected(variant: FrameVariant, reason: &'static str) {
    counter!("frames_rejected_total", "variant" => variant.as_str(), "reason" => reason)
        .increment(1);
}

/// Producer for a line that streams marker-delimited frames
pub struct ContinuousProducer {
    line: Arc<str>,
    sync: ContinuousSynchronizer,
    retry_sleep: Duration,
}

impl ContinuousProducer {
    pub fn new(
        line: impl Into<Arc<str>>,
        variant: FrameVariant,
        retry_sleep: Duration,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            line: line.into(),
            sync: ContinuousSynchronizer::new(variant)?,
            retry_sleep,
        })
    }

    /// Read and forward frames until shutdown or until the writer is gone
    pub async fn run<R>(
        mut self,
        mut port: R,
        tx: mpsc::Sender<FrameTask>,
        mut shutdown: ShutdownSignal,
    ) -> SyncStats
    where
        R: AsyncRead + Unpin,
    {
        let variant = self.sync.variant();
        info!(line = %self.line, %variant, "Continuous producer started");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                r = self.sync.receive(&mut port) => r,
            };

            match received {
                Ok(Some(frame)) => {
                    if !forward(&self.line, frame, &tx, &mut shutdown).await {
                        break;
                    }
                }
                Ok(None) => time::sleep(self.retry_sleep).await,
                Err(e) => {
                    warn!(line = %self.line, "Read failed: {}", e);
                    rejected(variant, "transport");
                    time::sleep(self.retry_sleep).await;
                }
            }
        }

        let stats = self.sync.stats();
        info!(
            line = %self.line,
            frames = stats.frames,
            checksum_failures = stats.checksum_failures,
            bytes_discarded = stats.bytes_discarded,
            "Continuous producer stopped"
        );
        stats
    }
}

/// Producer for a line that only answers the poll command
pub struct PollingProducer {
    line: Arc<str>,
    engine: RequestResponseEngine,
    interval: Duration,
}

impl PollingProducer {
    pub fn new(line: impl Into<Arc<str>>, interval: Duration, response_timeout: Duration) -> Self {
        let mut engine = RequestResponseEngine::new();
        engine.set_timeout(response_timeout);
        Self {
            line: line.into(),
            engine,
            interval,
        }
    }

    /// Poll on every tick until shutdown; returns (accepted replies, CRC failures)
    pub async fn run<P>(
        mut self,
        mut port: P,
        tx: mpsc::Sender<FrameTask>,
        mut shutdown: ShutdownSignal,
    ) -> (u64, u64)
    where
        P: AsyncRead + AsyncWrite + Unpin,
    {
        info!(line = %self.line, interval_ms = self.interval.as_millis() as u64, "Polling producer started");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                r = self.engine.poll(&mut port) => r,
            };

            match polled {
                Ok(frame) => {
                    if !forward(&self.line, frame, &tx, &mut shutdown).await {
                        break;
                    }
                }
                Err(ProtocolError::CrcMismatch { .. }) => rejected(FrameVariant::Lop2, "crc"),
                Err(e) => {
                    warn!(line = %self.line, "Poll failed: {}", e);
                    rejected(FrameVariant::Lop2, "transport");
                }
            }
        }

        let accepted = self.engine.polls();
        let crc_failures = self.engine.crc_failures();
        info!(line = %self.line, accepted, crc_failures, "Polling producer stopped");
        (accepted, crc_failures)
    }
}
