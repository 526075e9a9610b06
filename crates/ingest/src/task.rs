use std::sync::Arc;

use chrono::{DateTime, Local};
use frame_protocol::{FrameVariant, RawFrame};

/// A validated frame on its way from a line producer to the batch writer
#[derive(Debug, Clone)]
pub struct FrameTask {
    /// Name of the line it arrived on, stored as `device_id`
    pub line: Arc<str>,
    pub frame: RawFrame,
    pub received_at: DateTime<Local>,
}

impl FrameTask {
    pub fn new(line: Arc<str>, frame: RawFrame) -> Self {
        Self {
            line,
            frame,
            received_at: Local::now(),
        }
    }

    pub fn variant(&self) -> FrameVariant {
        self.frame.variant()
    }
}
