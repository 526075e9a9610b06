//! LOP Frame Decoding
//!
//! Turns validated raw frames into typed engineering-unit readings and the
//! list of active alarm descriptions. Decoding cannot fail: frames reach
//! this crate only after their checksum or CRC has been verified, and every
//! field offset is checked against the frame length at compile time.

pub mod alarms;
mod layout;
mod measurement;

pub use alarms::{active_alarms, alarm_map, AlarmMap};
pub use layout::{layout, FieldSpec, FieldValue, Scale};
pub use measurement::{
    decode, decode_at, Lop1Frame1Data, Lop1Frame2Data, Lop2Data, Measurement, Readings,
};
