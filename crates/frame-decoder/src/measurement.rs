//! Typed readings and the decoded measurement record

use chrono::{DateTime, Local};
use frame_protocol::limits::{LOP1_FRAME1_LEN, LOP1_FRAME2_LEN, LOP2_FRAME_LEN};
use frame_protocol::{Frame, FrameVariant, RawFrame};
use serde::Serialize;
use tracing::trace;

use crate::alarms::active_alarms;
use crate::layout::{self, lop1_frame1, lop1_frame2, lop2, FieldValue};

fn scaled<const N: usize>(frame: &Frame<N>, offset: usize, divisor: f64) -> f64 {
    f64::from(frame.be_u16(offset)) / divisor
}

/// LOP1 primary engine readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lop1Frame1Data {
    pub rpm: u16,
    /// bar
    pub oil_pressure: f64,
    /// °C
    pub freshwater_temp: f64,
    /// °C, whole degrees
    pub a_row_exhaust_temp: u16,
    /// °C, whole degrees
    pub b_row_exhaust_temp: u16,
    /// °C
    pub gear_oil_temp: f64,
    /// bar
    pub gear_oil_pressure: f64,
    /// bar
    pub seawater_pressure: f64,
}

impl Lop1Frame1Data {
    pub fn decode(frame: &Frame<LOP1_FRAME1_LEN>) -> Self {
        Self {
            rpm: frame.be_u16(lop1_frame1::RPM),
            oil_pressure: scaled(frame, lop1_frame1::OIL_PRESSURE, 100.0),
            freshwater_temp: scaled(frame, lop1_frame1::FRESHWATER_TEMP, 10.0),
            a_row_exhaust_temp: frame.be_u16(lop1_frame1::A_ROW_EXHAUST_TEMP),
            b_row_exhaust_temp: frame.be_u16(lop1_frame1::B_ROW_EXHAUST_TEMP),
            gear_oil_temp: scaled(frame, lop1_frame1::GEAR_OIL_TEMP, 10.0),
            gear_oil_pressure: scaled(frame, lop1_frame1::GEAR_OIL_PRESSURE, 100.0),
            seawater_pressure: scaled(frame, lop1_frame1::SEAWATER_PRESSURE, 100.0),
        }
    }
}

/// LOP1 auxiliary readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lop1Frame2Data {
    pub rpm: u16,
    /// °C
    pub oil_temp: f64,
    /// °C
    pub inlet_temp: f64,
    /// bar
    pub inlet_pressure: f64,
    /// bar
    pub fuel_pressure: f64,
    /// bar
    pub freshwater_pressure: f64,
}

impl Lop1Frame2Data {
    pub fn decode(frame: &Frame<LOP1_FRAME2_LEN>) -> Self {
        Self {
            rpm: frame.be_u16(lop1_frame2::RPM),
            oil_temp: scaled(frame, lop1_frame2::OIL_TEMP, 10.0),
            inlet_temp: scaled(frame, lop1_frame2::INLET_TEMP, 10.0),
            inlet_pressure: scaled(frame, lop1_frame2::INLET_PRESSURE, 100.0),
            fuel_pressure: scaled(frame, lop1_frame2::FUEL_PRESSURE, 100.0),
            freshwater_pressure: scaled(frame, lop1_frame2::FRESHWATER_PRESSURE, 100.0),
        }
    }
}

/// LOP2 generator set readings. Temperatures in °C, pressures in MPa.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lop2Data {
    pub rpm: u16,
    /// Accumulated running hours
    pub runtime: u16,
    pub inside_air_temp: f64,
    pub oil_temp: f64,
    pub freshwater_temp: f64,
    pub a_row_exhaust_temp: f64,
    pub b_row_exhaust_temp: f64,
    pub u_phase_temp: f64,
    pub v_phase_temp: f64,
    pub w_phase_temp: f64,
    pub front_bearing_temp: f64,
    pub rear_bearing_temp: f64,
    pub inlet_air_temp: f64,
    pub outlet_air_temp: f64,
    pub oil_pressure: f64,
    pub air_pressure: f64,
    pub fuel_pressure: f64,
}

impl Lop2Data {
    pub fn decode(frame: &Frame<LOP2_FRAME_LEN>) -> Self {
        Self {
            rpm: frame.be_u16(lop2::RPM),
            runtime: frame.be_u16(lop2::RUNTIME),
            inside_air_temp: scaled(frame, lop2::INSIDE_AIR_TEMP, 10.0),
            oil_temp: scaled(frame, lop2::OIL_TEMP, 10.0),
            freshwater_temp: scaled(frame, lop2::FRESHWATER_TEMP, 10.0),
            a_row_exhaust_temp: scaled(frame, lop2::A_ROW_EXHAUST_TEMP, 10.0),
            b_row_exhaust_temp: scaled(frame, lop2::B_ROW_EXHAUST_TEMP, 10.0),
            u_phase_temp: scaled(frame, lop2::U_PHASE_TEMP, 10.0),
            v_phase_temp: scaled(frame, lop2::V_PHASE_TEMP, 10.0),
            w_phase_temp: scaled(frame, lop2::W_PHASE_TEMP, 10.0),
            front_bearing_temp: scaled(frame, lop2::FRONT_BEARING_TEMP, 10.0),
            rear_bearing_temp: scaled(frame, lop2::REAR_BEARING_TEMP, 10.0),
            inlet_air_temp: scaled(frame, lop2::INLET_AIR_TEMP, 10.0),
            outlet_air_temp: scaled(frame, lop2::OUTLET_AIR_TEMP, 10.0),
            oil_pressure: scaled(frame, lop2::OIL_PRESSURE, 1000.0),
            air_pressure: scaled(frame, lop2::AIR_PRESSURE, 1000.0),
            fuel_pressure: scaled(frame, lop2::FUEL_PRESSURE, 1000.0),
        }
    }
}

/// Readings of one frame, tagged by variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Readings {
    Lop1Frame1(Lop1Frame1Data),
    Lop1Frame2(Lop1Frame2Data),
    Lop2(Lop2Data),
}

/// A decoded frame ready to persist
#[derive(Debug, Clone)]
pub struct Measurement {
    /// The validated frame it was decoded from
    pub raw: RawFrame,
    pub readings: Readings,
    /// Active alarm descriptions, ascending bit order
    pub alarms: Vec<String>,
    /// When the frame was taken off the line
    pub captured_at: DateTime<Local>,
}

impl Measurement {
    pub fn variant(&self) -> FrameVariant {
        self.raw.variant()
    }

    /// `(column, value)` pairs in layout order, read straight off the raw frame
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        layout::layout(self.variant())
            .iter()
            .map(|spec| {
                let value = match &self.raw {
                    RawFrame::Lop1Frame1(frame) => spec.read(frame),
                    RawFrame::Lop1Frame2(frame) => spec.read(frame),
                    RawFrame::Lop2(frame) => spec.read(frame),
                };
                (spec.name, value)
            })
            .collect()
    }

    pub fn rpm(&self) -> u16 {
        match &self.readings {
            Readings::Lop1Frame1(data) => data.rpm,
            Readings::Lop1Frame2(data) => data.rpm,
            Readings::Lop2(data) => data.rpm,
        }
    }
}

/// Decode a validated frame, stamping it with the current local time
pub fn decode(raw: RawFrame) -> Measurement {
    decode_at(raw, Local::now())
}

/// Decode a validated frame with an explicit capture time
pub fn decode_at(raw: RawFrame, captured_at: DateTime<Local>) -> Measurement {
    let readings = match &raw {
        RawFrame::Lop1Frame1(frame) => Readings::Lop1Frame1(Lop1Frame1Data::decode(frame)),
        RawFrame::Lop1Frame2(frame) => Readings::Lop1Frame2(Lop1Frame2Data::decode(frame)),
        RawFrame::Lop2(frame) => Readings::Lop2(Lop2Data::decode(frame)),
    };
    let alarms = active_alarms(&raw);

    trace!(
        variant = %raw.variant(),
        alarms = alarms.len(),
        "Decoded frame"
    );

    Measurement {
        raw,
        readings,
        alarms,
        captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout;
    use proptest::prelude::*;

    fn put(bytes: &mut [u8], offset: usize, value: u16) {
        bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    #[test]
    fn test_lop1_frame1_scaling() {
        let mut bytes = [0u8; LOP1_FRAME1_LEN];
        put(&mut bytes, 5, 1500);
        put(&mut bytes, 7, 250);
        put(&mut bytes, 9, 823);
        put(&mut bytes, 11, 412);
        put(&mut bytes, 19, 15);
        let raw = RawFrame::from_bytes(FrameVariant::Lop1Frame1, &bytes).unwrap();

        let m = decode(raw);
        match &m.readings {
            Readings::Lop1Frame1(data) => {
                assert_eq!(data.rpm, 1500);
                assert_eq!(data.oil_pressure, 2.5);
                assert!((data.freshwater_temp - 82.3).abs() < 1e-9);
                assert_eq!(data.a_row_exhaust_temp, 412);
                assert!((data.seawater_pressure - 0.15).abs() < 1e-9);
            }
            other => panic!("unexpected readings {:?}", other),
        }
        assert_eq!(m.rpm(), 1500);
        assert!(m.alarms.is_empty());
    }

    #[test]
    fn test_lop2_pressures_in_mpa() {
        let mut bytes = [0u8; LOP2_FRAME_LEN];
        put(&mut bytes, 3, 1800);
        put(&mut bytes, 5, 12345);
        put(&mut bytes, 31, 450);
        put(&mut bytes, 35, 1000);
        let raw = RawFrame::from_bytes(FrameVariant::Lop2, &bytes).unwrap();

        let m = decode(raw);
        let fields = m.fields();
        assert_eq!(fields[0], ("rpm", FieldValue::Integer(1800)));
        assert_eq!(fields[1], ("runtime", FieldValue::Integer(12345)));
        assert_eq!(fields[14], ("oil_pressure", FieldValue::Real(0.45)));
        assert_eq!(fields[16], ("fuel_pressure", FieldValue::Real(1.0)));
    }

    #[test]
    fn test_readings_serialize_with_variant_tag() {
        let raw = RawFrame::from_bytes(FrameVariant::Lop1Frame2, &[0u8; LOP1_FRAME2_LEN]).unwrap();
        let json = serde_json::to_value(&decode(raw).readings).unwrap();
        assert_eq!(json["variant"], "lop1_frame2");
        assert_eq!(json["rpm"], 0);
        assert_eq!(json["fuel_pressure"], 0.0);
    }

    proptest! {
        // Typed readings and the column values agree field by field
        #[test]
        fn prop_readings_match_fields(bytes in proptest::collection::vec(any::<u8>(), LOP2_FRAME_LEN)) {
            for variant in FrameVariant::ALL {
                let raw = RawFrame::from_bytes(variant, &bytes[..variant.frame_len()]).unwrap();
                let m = decode(raw);
                let fields = m.fields();
                prop_assert_eq!(fields.len(), layout(variant).len());

                let typed = serde_json::to_value(&m.readings).unwrap();
                let object = typed.as_object().unwrap();
                // every typed field plus the variant tag
                prop_assert_eq!(object.len(), fields.len() + 1);
                for (name, value) in &fields {
                    prop_assert_eq!(&object[*name], &serde_json::to_value(value).unwrap());
                }
            }
        }
    }
}
