//! Frame Variants and Owned Raw Frames

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::limits::{LOP1_FRAME1_LEN, LOP1_FRAME2_LEN, LOP2_FRAME_LEN};

/// Start-of-frame marker of the continuous protocol
pub const MARKER: [u8; 2] = [0xFA, 0xF5];

/// The three frame families emitted by the engine panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameVariant {
    /// LOP1 primary engine frame (continuous, 35 bytes)
    Lop1Frame1,
    /// LOP1 auxiliary frame (continuous, 32 bytes)
    Lop1Frame2,
    /// LOP2 generator set reply (request-response, 65 bytes)
    Lop2,
}

impl FrameVariant {
    /// All variants, in table order
    pub const ALL: [FrameVariant; 3] = [
        FrameVariant::Lop1Frame1,
        FrameVariant::Lop1Frame2,
        FrameVariant::Lop2,
    ];

    /// Fixed frame length on the wire
    pub const fn frame_len(&self) -> usize {
        match self {
            FrameVariant::Lop1Frame1 => LOP1_FRAME1_LEN,
            FrameVariant::Lop1Frame2 => LOP1_FRAME2_LEN,
            FrameVariant::Lop2 => LOP2_FRAME_LEN,
        }
    }

    /// Whether frames arrive unsolicited behind the `FA F5` marker
    pub fn is_continuous(&self) -> bool {
        matches!(self, FrameVariant::Lop1Frame1 | FrameVariant::Lop1Frame2)
    }

    /// Configuration / metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameVariant::Lop1Frame1 => "lop1_frame1",
            FrameVariant::Lop1Frame2 => "lop1_frame2",
            FrameVariant::Lop2 => "lop2",
        }
    }
}

impl fmt::Display for FrameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameVariant {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FrameVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownVariant(s.to_string()))
    }
}

/// A fixed-length frame whose size is known at compile time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<const N: usize>([u8; N]);

impl<const N: usize> Frame<N> {
    /// Frame length in bytes
    pub const LEN: usize = N;

    /// Wrap an owned byte array
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Copy a frame out of a slice of exactly `N` bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; N]>::try_from(bytes).ok().map(Self)
    }

    /// Borrow the frame bytes
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Byte at `offset`, or 0 past the end
    pub fn byte(&self, offset: usize) -> u8 {
        self.0.get(offset).copied().unwrap_or(0)
    }

    /// Big-endian u16 starting at `offset`.
    ///
    /// Decoder layouts are checked against `N` at compile time, so the
    /// zero fallback is never observed through them.
    pub fn be_u16(&self, offset: usize) -> u16 {
        match self.0.get(offset..offset + 2) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
            _ => {
                debug_assert!(false, "u16 read at {} past frame end {}", offset, N);
                0
            }
        }
    }

    /// Uppercase hex dump without separators
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

/// A validated frame of one of the known variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Lop1Frame1(Frame<LOP1_FRAME1_LEN>),
    Lop1Frame2(Frame<LOP1_FRAME2_LEN>),
    Lop2(Frame<LOP2_FRAME_LEN>),
}

impl RawFrame {
    /// Build a frame of `variant` from a slice of exactly the variant length
    pub fn from_bytes(variant: FrameVariant, bytes: &[u8]) -> Option<Self> {
        match variant {
            FrameVariant::Lop1Frame1 => Frame::from_slice(bytes).map(RawFrame::Lop1Frame1),
            FrameVariant::Lop1Frame2 => Frame::from_slice(bytes).map(RawFrame::Lop1Frame2),
            FrameVariant::Lop2 => Frame::from_slice(bytes).map(RawFrame::Lop2),
        }
    }

    /// The variant tag
    pub fn variant(&self) -> FrameVariant {
        match self {
            RawFrame::Lop1Frame1(_) => FrameVariant::Lop1Frame1,
            RawFrame::Lop1Frame2(_) => FrameVariant::Lop1Frame2,
            RawFrame::Lop2(_) => FrameVariant::Lop2,
        }
    }

    /// Borrow the frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawFrame::Lop1Frame1(f) => f.as_bytes(),
            RawFrame::Lop1Frame2(f) => f.as_bytes(),
            RawFrame::Lop2(f) => f.as_bytes(),
        }
    }

    /// Uppercase hex dump without separators
    pub fn to_hex(&self) -> String {
        to_hex(self.as_bytes())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02X}", b);
        out
    })
}
