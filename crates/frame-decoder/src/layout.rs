//! Field Offset Tables
//!
//! Every measurement is a big-endian u16 at a fixed offset, either stored
//! as-is or divided by a fixed factor to reach its physical unit.

use frame_protocol::limits::{LOP1_FRAME1_LEN, LOP1_FRAME2_LEN, LOP2_FRAME_LEN};
use frame_protocol::{Frame, FrameVariant};
use serde::Serialize;

/// How a raw u16 maps to its physical value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Stored unscaled (rpm, hours, whole degrees)
    Raw,
    /// Divided by a fixed factor
    Divide(f64),
}

/// A decoded field value as it is bound into storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
}

/// One named field of a frame layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Column / field name
    pub name: &'static str,
    /// Byte offset of the big-endian u16
    pub offset: usize,
    /// Scaling rule
    pub scale: Scale,
}

impl FieldSpec {
    const fn raw(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            scale: Scale::Raw,
        }
    }

    const fn scaled(name: &'static str, offset: usize, divisor: f64) -> Self {
        Self {
            name,
            offset,
            scale: Scale::Divide(divisor),
        }
    }

    /// Whether the field is stored as an integer
    pub fn is_integer(&self) -> bool {
        matches!(self.scale, Scale::Raw)
    }

    /// Read the field from a frame
    pub fn read<const N: usize>(&self, frame: &Frame<N>) -> FieldValue {
        let raw = frame.be_u16(self.offset);
        match self.scale {
            Scale::Raw => FieldValue::Integer(i64::from(raw)),
            Scale::Divide(divisor) => FieldValue::Real(f64::from(raw) / divisor),
        }
    }
}

pub(crate) mod lop1_frame1 {
    pub const RPM: usize = 5;
    pub const OIL_PRESSURE: usize = 7;
    pub const FRESHWATER_TEMP: usize = 9;
    pub const A_ROW_EXHAUST_TEMP: usize = 11;
    pub const B_ROW_EXHAUST_TEMP: usize = 13;
    pub const GEAR_OIL_TEMP: usize = 15;
    pub const GEAR_OIL_PRESSURE: usize = 17;
    pub const SEAWATER_PRESSURE: usize = 19;
}

pub(crate) mod lop1_frame2 {
    pub const RPM: usize = 5;
    pub const OIL_TEMP: usize = 7;
    pub const INLET_TEMP: usize = 9;
    pub const INLET_PRESSURE: usize = 11;
    pub const FUEL_PRESSURE: usize = 13;
    pub const FRESHWATER_PRESSURE: usize = 15;
}

pub(crate) mod lop2 {
    pub const RPM: usize = 3;
    pub const RUNTIME: usize = 5;
    pub const INSIDE_AIR_TEMP: usize = 7;
    pub const OIL_TEMP: usize = 9;
    pub const FRESHWATER_TEMP: usize = 11;
    pub const A_ROW_EXHAUST_TEMP: usize = 13;
    pub const B_ROW_EXHAUST_TEMP: usize = 15;
    pub const U_PHASE_TEMP: usize = 17;
    pub const V_PHASE_TEMP: usize = 19;
    pub const W_PHASE_TEMP: usize = 21;
    pub const FRONT_BEARING_TEMP: usize = 23;
    pub const REAR_BEARING_TEMP: usize = 25;
    pub const INLET_AIR_TEMP: usize = 27;
    pub const OUTLET_AIR_TEMP: usize = 29;
    pub const OIL_PRESSURE: usize = 31;
    pub const AIR_PRESSURE: usize = 33;
    pub const FUEL_PRESSURE: usize = 35;
}

pub(crate) const LOP1_FRAME1_LAYOUT: &[FieldSpec] = &[
    FieldSpec::raw("rpm", lop1_frame1::RPM),
    FieldSpec::scaled("oil_pressure", lop1_frame1::OIL_PRESSURE, 100.0),
    FieldSpec::scaled("freshwater_temp", lop1_frame1::FRESHWATER_TEMP, 10.0),
    FieldSpec::raw("a_row_exhaust_temp", lop1_frame1::A_ROW_EXHAUST_TEMP),
    FieldSpec::raw("b_row_exhaust_temp", lop1_frame1::B_ROW_EXHAUST_TEMP),
    FieldSpec::scaled("gear_oil_temp", lop1_frame1::GEAR_OIL_TEMP, 10.0),
    FieldSpec::scaled("gear_oil_pressure", lop1_frame1::GEAR_OIL_PRESSURE, 100.0),
    FieldSpec::scaled("seawater_pressure", lop1_frame1::SEAWATER_PRESSURE, 100.0),
];

pub(crate) const LOP1_FRAME2_LAYOUT: &[FieldSpec] = &[
    FieldSpec::raw("rpm", lop1_frame2::RPM),
    FieldSpec::scaled("oil_temp", lop1_frame2::OIL_TEMP, 10.0),
    FieldSpec::scaled("inlet_temp", lop1_frame2::INLET_TEMP, 10.0),
    FieldSpec::scaled("inlet_pressure", lop1_frame2::INLET_PRESSURE, 100.0),
    FieldSpec::scaled("fuel_pressure", lop1_frame2::FUEL_PRESSURE, 100.0),
    FieldSpec::scaled("freshwater_pressure", lop1_frame2::FRESHWATER_PRESSURE, 100.0),
];

pub(crate) const LOP2_LAYOUT: &[FieldSpec] = &[
    FieldSpec::raw("rpm", lop2::RPM),
    FieldSpec::raw("runtime", lop2::RUNTIME),
    FieldSpec::scaled("inside_air_temp", lop2::INSIDE_AIR_TEMP, 10.0),
    FieldSpec::scaled("oil_temp", lop2::OIL_TEMP, 10.0),
    FieldSpec::scaled("freshwater_temp", lop2::FRESHWATER_TEMP, 10.0),
    FieldSpec::scaled("a_row_exhaust_temp", lop2::A_ROW_EXHAUST_TEMP, 10.0),
    FieldSpec::scaled("b_row_exhaust_temp", lop2::B_ROW_EXHAUST_TEMP, 10.0),
    FieldSpec::scaled("u_phase_temp", lop2::U_PHASE_TEMP, 10.0),
    FieldSpec::scaled("v_phase_temp", lop2::V_PHASE_TEMP, 10.0),
    FieldSpec::scaled("w_phase_temp", lop2::W_PHASE_TEMP, 10.0),
    FieldSpec::scaled("front_bearing_temp", lop2::FRONT_BEARING_TEMP, 10.0),
    FieldSpec::scaled("rear_bearing_temp", lop2::REAR_BEARING_TEMP, 10.0),
    FieldSpec::scaled("inlet_air_temp", lop2::INLET_AIR_TEMP, 10.0),
    FieldSpec::scaled("outlet_air_temp", lop2::OUTLET_AIR_TEMP, 10.0),
    FieldSpec::scaled("oil_pressure", lop2::OIL_PRESSURE, 1000.0),
    FieldSpec::scaled("air_pressure", lop2::AIR_PRESSURE, 1000.0),
    FieldSpec::scaled("fuel_pressure", lop2::FUEL_PRESSURE, 1000.0),
];

const fn fits(layout: &[FieldSpec], frame_len: usize) -> bool {
    let mut i = 0;
    while i < layout.len() {
        if layout[i].offset + 2 > frame_len {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(fits(LOP1_FRAME1_LAYOUT, LOP1_FRAME1_LEN));
const _: () = assert!(fits(LOP1_FRAME2_LAYOUT, LOP1_FRAME2_LEN));
const _: () = assert!(fits(LOP2_LAYOUT, LOP2_FRAME_LEN));

/// Field table of a variant, in storage column order
pub fn layout(variant: FrameVariant) -> &'static [FieldSpec] {
    match variant {
        FrameVariant::Lop1Frame1 => LOP1_FRAME1_LAYOUT,
        FrameVariant::Lop1Frame2 => LOP1_FRAME2_LAYOUT,
        FrameVariant::Lop2 => LOP2_LAYOUT,
    }
}
