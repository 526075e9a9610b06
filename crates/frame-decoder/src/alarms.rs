//! Alarm Bitmap Tables
//!
//! Each variant carries a contiguous run of alarm bytes. Bit `b` of byte
//! `first_byte + k` is alarm index `k * 8 + b`; a set bit yields the
//! description registered for that index, or a placeholder when the panel
//! reports a bit no table entry covers.
//!
//! ALSY is the alarm system, SISY the independent safety system.

use frame_protocol::limits::{LOP1_FRAME1_LEN, LOP1_FRAME2_LEN, LOP2_FRAME_LEN};
use frame_protocol::{FrameVariant, RawFrame};

/// Alarm byte range of one variant and its index → description table
#[derive(Debug)]
pub struct AlarmMap {
    /// First alarm byte (inclusive)
    pub first_byte: usize,
    /// Last alarm byte (inclusive)
    pub last_byte: usize,
    entries: &'static [(u16, &'static str)],
}

impl AlarmMap {
    /// Description registered for a bit index
    pub fn describe(&self, index: u16) -> Option<&'static str> {
        self.entries
            .binary_search_by_key(&index, |&(i, _)| i)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Number of registered alarm bits
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions of every set bit, in ascending index order
    pub fn decode(&self, frame: &[u8]) -> Vec<String> {
        let Some(bytes) = frame.get(self.first_byte..=self.last_byte) else {
            return Vec::new();
        };

        let mut active = Vec::new();
        for (k, &byte) in bytes.iter().enumerate() {
            if byte == 0 {
                continue;
            }
            for bit in 0..8u16 {
                if byte & (1 << bit) == 0 {
                    continue;
                }
                let index = k as u16 * 8 + bit;
                match self.describe(index) {
                    Some(text) => active.push(text.to_string()),
                    None => active.push(format!("Unknown alarm bit {}", index)),
                }
            }
        }
        active
    }
}

const fn well_formed(map: &AlarmMap, frame_len: usize) -> bool {
    if map.first_byte > map.last_byte || map.last_byte >= frame_len {
        return false;
    }
    let bits = ((map.last_byte - map.first_byte + 1) * 8) as u16;
    let mut i = 0;
    while i < map.entries.len() {
        if map.entries[i].0 >= bits {
            return false;
        }
        if i > 0 && map.entries[i - 1].0 >= map.entries[i].0 {
            return false;
        }
        i += 1;
    }
    true
}

/// LOP1 primary frame, bytes 21..=29
pub const LOP1_FRAME1: AlarmMap = AlarmMap {
    first_byte: 21,
    last_byte: 29,
    entries: &[
        (1, "ALSY local emergency stop button wire break"),
        (2, "ALSY remote emergency stop button wire break"),
        (4, "ALSY fresh water temperature sensor open circuit"),
        (5, "ALSY fresh water temperature sensor short circuit"),
        (6, "ALSY gear oil temperature sensor open circuit"),
        (7, "ALSY gear oil temperature sensor short circuit"),
        (8, "ALSY sea water pressure sensor current too low"),
        (9, "ALSY sea water pressure sensor current too high"),
        (10, "ALSY gear oil pressure sensor current too high"),
        (11, "ALSY gear oil pressure sensor current too low"),
        (12, "ALSY lube oil pressure sensor current too high"),
        (13, "ALSY lube oil pressure sensor current too low"),
        (14, "ALSY override button wire break"),
        (17, "SISY remote emergency stop button wire break"),
        (18, "SISY local emergency stop button wire break"),
        (19, "SISY fresh water temperature sensor short circuit"),
        (20, "SISY fresh water temperature sensor open circuit"),
        (22, "SISY lube oil pressure sensor current too high"),
        (23, "SISY lube oil pressure sensor current too low"),
        (24, "SISY override button wire break"),
        (25, "SISY intake flap relay wire break"),
        (26, "ALSY+SISY speed sensor fault"),
        (32, "Fresh water leakage alarm"),
        (33, "Fuel leakage alarm"),
        (34, "Intake flap closed alarm"),
        (35, "Local alarm acknowledge"),
        (36, "Remote start"),
        (37, "Remote stop"),
        (38, "Emergency stop"),
        (39, "Override"),
        (41, "Alarm reset"),
        (42, "Standby ready"),
        (43, "Remote start release"),
        (44, "Local control"),
        (45, "Stopped (speed below 50)"),
        (46, "Starting (speed below 300)"),
        (48, "Speed above 300"),
        (49, "Overspeed emergency stop"),
        (50, "Fresh water temperature high alarm"),
        (51, "Fresh water temperature too high shutdown"),
        (52, "Lube oil pressure low alarm"),
        (53, "Lube oil pressure too low shutdown"),
        (54, "Intake flap closed"),
        (56, "Sea water pressure low alarm"),
        (57, "Gear oil pressure low alarm"),
        (58, "Gear oil temperature high alarm"),
        (59, "A-row exhaust temperature high alarm"),
        (60, "B-row exhaust temperature high alarm"),
        (61, "Gear oil pressure too low shutdown"),
        (62, "Water in oil alarm"),
        (63, "Start failure"),
        (64, "ALSY sensor fault alarm"),
        (66, "ALSY emergency stop test"),
        (67, "SISY emergency stop test"),
        (68, "SISY sensor fault alarm"),
        (69, "SISY speed sensor fault alarm"),
        (70, "ALSY speed sensor fault alarm"),
    ],
};

/// LOP1 auxiliary frame, bytes 21..=25
pub const LOP1_FRAME2: AlarmMap = AlarmMap {
    first_byte: 21,
    last_byte: 25,
    entries: &[
        (0, "Speed stage 1 reached"),
        (1, "Speed stage 2 reached"),
        (2, "Speed stage 3 reached"),
        (3, "Speed stage 4 reached"),
        (8, "Intake pressure sensor current too low"),
        (9, "Intake pressure sensor current too high"),
        (10, "Fuel pressure sensor current too low"),
        (11, "Fuel pressure sensor current too high"),
        (12, "Fresh water pressure sensor current too low"),
        (13, "Fresh water pressure sensor current too high"),
        (16, "Fuel temperature sensor (PT1000) short circuit"),
        (17, "Fuel temperature sensor (PT1000) open circuit"),
        (18, "Intake temperature sensor (PT1000) short circuit"),
        (19, "Intake temperature sensor (PT1000) open circuit"),
        (24, "Fuel temperature high alarm"),
        (25, "Intake temperature high alarm"),
        (27, "Fuel pressure low alarm"),
        (28, "Fresh water pressure low alarm"),
        (34, "Lube oil leakage alarm"),
        (35, "Starting air pressure low alarm"),
        (36, "Automatic oil priming pressure low alarm"),
    ],
};

/// LOP2 generator set reply, bytes 55..=62
pub const LOP2: AlarmMap = AlarmMap {
    first_byte: 55,
    last_byte: 62,
    entries: &[
        (0, "Exhaust flap closed"),
        (8, "Generator set running"),
        (13, "Local/remote"),
        (14, "Generator set standby ready"),
        (15, "Enclosure 1301 extinguishing released"),
        (17, "Generator set level 2 alarm"),
        (18, "Lube oil pressure low"),
        (19, "Lube oil temperature high"),
        (20, "Cooling water pressure low"),
        (21, "Generator winding temperature high"),
        (24, "Generator set level 1 alarm"),
        (25, "Cooling water temperature too high"),
        (26, "Lube oil pressure too low"),
        (27, "Overspeed shutdown"),
        (28, "Enclosure fire emergency stop"),
        (29, "Generator winding temperature too high trip"),
        (32, "Fuel leakage alarm"),
        (33, "Enclosure air temperature high"),
        (34, "Generator front bearing temperature high"),
        (35, "Generator rear bearing temperature high"),
        (36, "Cooler outlet air temperature high"),
        (37, "Generator sea water leakage"),
        (38, "Rotating diode failure"),
        (39, "Generator overvoltage"),
        (40, "Generator set general fault alarm"),
        (41, "Starting air pressure low"),
        (42, "Sludge tank level high"),
        (43, "A-row exhaust temperature high"),
        (44, "B-row exhaust temperature high"),
        (45, "Cooling water temperature high"),
        (46, "Sea water pressure low"),
        (47, "Cooling water level low"),
        (56, "Fuel pressure low"),
        (59, "Enclosure fan overload"),
        (60, "Sensor failure"),
        (61, "Return oil cooler sea water leakage"),
    ],
};

const _: () = assert!(well_formed(&LOP1_FRAME1, LOP1_FRAME1_LEN));
const _: () = assert!(well_formed(&LOP1_FRAME2, LOP1_FRAME2_LEN));
const _: () = assert!(well_formed(&LOP2, LOP2_FRAME_LEN));

/// Alarm table of a variant
pub fn alarm_map(variant: FrameVariant) -> &'static AlarmMap {
    match variant {
        FrameVariant::Lop1Frame1 => &LOP1_FRAME1,
        FrameVariant::Lop1Frame2 => &LOP1_FRAME2,
        FrameVariant::Lop2 => &LOP2,
    }
}

/// Active alarm descriptions of a validated frame
pub fn active_alarms(frame: &RawFrame) -> Vec<String> {
    alarm_map(frame.variant()).decode(frame.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lop1_frame1_with(alarm_bytes: &[(usize, u8)]) -> RawFrame {
        let mut bytes = [0u8; LOP1_FRAME1_LEN];
        for &(pos, value) in alarm_bytes {
            bytes[pos] = value;
        }
        RawFrame::from_bytes(FrameVariant::Lop1Frame1, &bytes).unwrap()
    }

    #[test]
    fn test_no_bits_no_alarms() {
        assert!(active_alarms(&lop1_frame1_with(&[])).is_empty());
    }

    #[test]
    fn test_bits_in_ascending_order() {
        // byte 25 bit 0 → 32, byte 21 bit 1 → 1, byte 29 bit 6 → 70
        let frame = lop1_frame1_with(&[(25, 0x01), (21, 0x02), (29, 0x40)]);
        assert_eq!(
            active_alarms(&frame),
            vec![
                "ALSY local emergency stop button wire break".to_string(),
                "Fresh water leakage alarm".to_string(),
                "ALSY speed sensor fault alarm".to_string(),
            ]
        );
    }

    #[test]
    fn test_unmapped_bit_placeholder() {
        // byte 21 bit 0 (index 0) has no description
        let frame = lop1_frame1_with(&[(21, 0x01)]);
        assert_eq!(active_alarms(&frame), vec!["Unknown alarm bit 0".to_string()]);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let frame = lop1_frame1_with(&[(22, 0xFF), (27, 0x81)]);
        assert_eq!(active_alarms(&frame), active_alarms(&frame));
    }

    #[test]
    fn test_lop2_range() {
        let mut bytes = [0u8; LOP2_FRAME_LEN];
        bytes[55] = 0x01;
        bytes[56] = 0x01;
        bytes[62] = 0x20;
        let frame = RawFrame::from_bytes(FrameVariant::Lop2, &bytes).unwrap();
        assert_eq!(
            active_alarms(&frame),
            vec![
                "Exhaust flap closed".to_string(),
                "Generator set running".to_string(),
                "Return oil cooler sea water leakage".to_string(),
            ]
        );
    }

    #[test]
    fn test_bytes_outside_range_ignored() {
        let mut bytes = [0u8; LOP1_FRAME2_LEN];
        bytes[20] = 0xFF;
        bytes[26] = 0xFF;
        let frame = RawFrame::from_bytes(FrameVariant::Lop1Frame2, &bytes).unwrap();
        assert!(active_alarms(&frame).is_empty());
    }

    #[test]
    fn test_describe_lookup() {
        assert_eq!(LOP1_FRAME2.describe(36), Some("Automatic oil priming pressure low alarm"));
        assert_eq!(LOP1_FRAME2.describe(37), None);
        assert_eq!(LOP2.len(), 36);
    }
}
