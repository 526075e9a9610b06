//! Frame integrity checks
//!
//! Continuous frames carry a single checksum byte at `len - 3` chosen so
//! that the wrapping sum of every frame byte is zero. Polled replies end in
//! a Modbus CRC16 that the panel transmits low byte first; [`crc16`]
//! returns it byte-swapped so it compares big-endian against the trailer.

use crc::{Crc, CRC_16_MODBUS};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Wrapping (mod 256) sum of `bytes`
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Whether a continuous frame sums to zero
pub fn verify_sum8(frame: &[u8]) -> bool {
    !frame.is_empty() && sum8(frame) == 0
}

/// Position of the checksum byte in a continuous frame of `len` bytes
pub fn sum8_position(len: usize) -> Option<usize> {
    len.checked_sub(3)
}

/// Write the checksum byte so `frame` passes [`verify_sum8`]
pub fn seal_sum8(frame: &mut [u8]) {
    if let Some(pos) = sum8_position(frame.len()) {
        frame[pos] = 0;
        frame[pos] = 0u8.wrapping_sub(sum8(frame));
    }
}

/// CRC16 as compared against the big-endian reply trailer
pub fn crc16(bytes: &[u8]) -> u16 {
    MODBUS.checksum(bytes).swap_bytes()
}

/// Split a reply into (computed, received) CRC values
pub fn crc16_pair(frame: &[u8]) -> Option<(u16, u16)> {
    let body_len = frame.len().checked_sub(2)?;
    let (body, trailer) = frame.split_at(body_len);
    Some((crc16(body), u16::from_be_bytes([trailer[0], trailer[1]])))
}

/// Whether a polled reply carries a matching CRC16 trailer
pub fn verify_crc16(frame: &[u8]) -> bool {
    matches!(crc16_pair(frame), Some((computed, received)) if computed == received)
}

/// Append the CRC16 trailer to `body`
pub fn append_crc16(body: &mut Vec<u8>) {
    let crc = crc16(body);
    body.extend_from_slice(&crc.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_matches_poll_command_trailer() {
        // The fixed poll command carries its own CRC: C5 C2
        let body = [0x01, 0x03, 0x00, 0x00, 0x00, 0x1E];
        assert_eq!(crc16(&body), 0xC5C2);
        assert!(verify_crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x1E, 0xC5, 0xC2]));
    }

    #[test]
    fn test_crc16_rejects_flipped_trailer() {
        let mut reply = vec![0x01, 0x03, 0x3C];
        reply.extend((0..60).map(|i| i as u8));
        append_crc16(&mut reply);
        assert_eq!(reply.len(), 65);
        assert!(verify_crc16(&reply));

        reply[63] ^= 0xFF;
        reply[64] ^= 0xFF;
        assert!(!verify_crc16(&reply));
    }

    #[test]
    fn test_sum8_seal() {
        let mut frame = [0u8; 35];
        frame[0] = 0xFA;
        frame[1] = 0xF5;
        frame[3] = 0x23;
        frame[5] = 0x07;
        seal_sum8(&mut frame);
        assert!(verify_sum8(&frame));
        assert_eq!(sum8(&frame), 0);

        frame[10] = frame[10].wrapping_add(1);
        assert!(!verify_sum8(&frame));
    }
}
