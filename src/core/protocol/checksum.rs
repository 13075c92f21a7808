//! CRC-16/Modbus
//!
//! Reflected polynomial 0xA001, initial value 0xFFFF, transmitted low byte first.

/// CRC-16 Modbus (polynomial 0x8005 reflected, init 0xFFFF)
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Append the CRC of `frame` in wire order
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_modbus(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Split a frame into body and trailing CRC, returning `(calculated, received)`
///
/// Returns `None` for frames shorter than the CRC itself.
pub fn frame_crc(frame: &[u8]) -> Option<(u16, u16)> {
    let body_len = frame.len().checked_sub(2)?;
    let (body, tail) = frame.split_at(body_len);
    Some((crc16_modbus(body), u16::from_le_bytes([tail[0], tail[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus() {
        // Test vector: "123456789" should give 0x4B37
        let data = b"123456789";
        assert_eq!(crc16_modbus(data), 0x4B37);
    }

    #[test]
    fn test_reference_request_frame() {
        // Read 10 holding registers from slave 1: 01 03 00 00 00 0A C5 CD
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        append_crc(&mut frame);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert_eq!(frame_crc(&frame), Some((0xCDC5, 0xCDC5)));
    }

    #[test]
    fn test_frame_crc_short() {
        assert_eq!(frame_crc(&[0x01]), None);
        assert_eq!(frame_crc(&[0xFF, 0xFF]), Some((0xFFFF, 0xFFFF)));
    }
}
