//! Modbus RTU framing
//!
//! Only the three function codes the register bus uses are supported:
//! read holding registers, read input registers and write multiple registers.

use super::checksum;
use thiserror::Error;

/// Largest read response accepted, in bytes
pub const MAX_READ_RESPONSE: usize = 260;

/// Largest write request built, in bytes
pub const MAX_WRITE_REQUEST: usize = 256;

/// Length of a write-multiple-registers echo
pub const WRITE_RESPONSE_LEN: usize = 8;

/// Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Get function code from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Get name of function code
    pub fn name(&self) -> &'static str {
        match self {
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

/// Response validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the response needs
    #[error("response truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// Header does not echo the request
    #[error("unexpected response: {0}")]
    Mismatch(&'static str),

    /// Trailing CRC does not match the frame body
    #[error("CRC mismatch: calculated {calculated:04X}, received {received:04X}")]
    Crc {
        /// CRC over the received body
        calculated: u16,
        /// CRC carried by the frame
        received: u16,
    },
}

/// Bytes in a read response carrying `count` registers
pub fn read_response_len(count: u16) -> usize {
    5 + 2 * usize::from(count)
}

/// Bytes in a write request carrying `count` registers
pub fn write_request_len(count: usize) -> usize {
    9 + 2 * count
}

/// Build Modbus RTU read request frame
pub fn build_rtu_request(slave_id: u8, function: FunctionCode, start_address: u16, quantity: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave_id);
    frame.push(function as u8);
    frame.extend_from_slice(&start_address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    checksum::append_crc(&mut frame);
    frame
}

/// Build Modbus RTU write multiple registers request
///
/// The caller bounds `values` so that the quantity and byte count fit the frame.
#[allow(clippy::cast_possible_truncation)]
pub fn build_rtu_write_multiple_registers(slave_id: u8, start_address: u16, values: &[u16]) -> Vec<u8> {
    let quantity = values.len() as u16;
    let byte_count = (values.len() * 2) as u8;

    let mut frame = Vec::with_capacity(write_request_len(values.len()));
    frame.push(slave_id);
    frame.push(FunctionCode::WriteMultipleRegisters as u8);
    frame.extend_from_slice(&start_address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    frame.push(byte_count);

    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }

    checksum::append_crc(&mut frame);
    frame
}

/// Validate a read response and decode its registers
///
/// Checks run in order: length, echoed header, CRC.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_read_response(
    data: &[u8],
    slave_id: u8,
    function: FunctionCode,
    count: u16,
) -> Result<Vec<u16>, FrameError> {
    let expected = read_response_len(count);
    if data.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let data = &data[..expected];

    if data[0] != slave_id {
        return Err(FrameError::Mismatch("slave id"));
    }
    if data[1] != function as u8 {
        return Err(FrameError::Mismatch("function code"));
    }
    if data[2] != (count * 2) as u8 {
        return Err(FrameError::Mismatch("byte count"));
    }
    verify_crc(data)?;

    Ok(parse_registers(&data[3..expected - 2]))
}

/// Validate the echo of a write multiple registers request
pub fn check_write_response(data: &[u8], request: &[u8]) -> Result<(), FrameError> {
    if data.len() < WRITE_RESPONSE_LEN {
        return Err(FrameError::Truncated {
            expected: WRITE_RESPONSE_LEN,
            actual: data.len(),
        });
    }
    let data = &data[..WRITE_RESPONSE_LEN];

    if request.len() < 6 || data[0] != request[0] {
        return Err(FrameError::Mismatch("slave id"));
    }
    if data[1] != FunctionCode::WriteMultipleRegisters as u8 {
        return Err(FrameError::Mismatch("function code"));
    }
    if data[2..6] != request[2..6] {
        return Err(FrameError::Mismatch("address or quantity"));
    }
    verify_crc(data)
}

fn verify_crc(frame: &[u8]) -> Result<(), FrameError> {
    match checksum::frame_crc(frame) {
        Some((calculated, received)) if calculated == received => Ok(()),
        Some((calculated, received)) => Err(FrameError::Crc { calculated, received }),
        None => Err(FrameError::Truncated {
            expected: 2,
            actual: frame.len(),
        }),
    }
}

/// Extract register values from response data
pub fn parse_registers(data: &[u8]) -> Vec<u16> {
    data.chunks(2)
        .map(|chunk| {
            if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                0
            }
        })
        .collect()
}

/// Format an RTU frame for trace output
pub fn format_frame(data: &[u8]) -> String {
    if data.len() < 4 {
        return format!("RTU: short frame {}", hex::encode(data));
    }
    let function = FunctionCode::from_u8(data[1] & 0x7F).map_or("Unknown", |f| f.name());
    let exception = if data[1] & 0x80 == 0 { "" } else { " exception" };
    format!(
        "RTU: Slave={:02X} Func={:02X} ({function}{exception}) Data={} CRC={:04X}",
        data[0],
        data[1],
        hex::encode(&data[2..data.len() - 2]),
        u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_response(slave: u8, function: u8, words: &[u16]) -> Vec<u8> {
        let mut frame = vec![slave, function, (words.len() * 2) as u8];
        for w in words {
            frame.extend_from_slice(&w.to_be_bytes());
        }
        checksum::append_crc(&mut frame);
        frame
    }

    #[test]
    fn test_build_rtu_read_input_registers() {
        let frame = build_rtu_request(1, FunctionCode::ReadInputRegisters, 2000, 6);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..6], &[0x01, 0x04, 0x07, 0xD0, 0x00, 0x06]);
        assert_eq!(checksum::frame_crc(&frame).map(|(a, b)| a == b), Some(true));
    }

    #[test]
    fn test_build_write_multiple_registers() {
        let frame = build_rtu_write_multiple_registers(1, 2006, &[0x0061, 0x0002, 0x00F0]);
        assert_eq!(frame.len(), write_request_len(3));
        assert_eq!(
            &frame[..13],
            &[0x01, 0x10, 0x07, 0xD6, 0x00, 0x03, 0x06, 0x00, 0x61, 0x00, 0x02, 0x00, 0xF0]
        );
    }

    #[test]
    fn test_parse_read_response() {
        let resp = read_response(1, 0x04, &[0x1234, 0x00FF]);
        let words = parse_read_response(&resp, 1, FunctionCode::ReadInputRegisters, 2).unwrap();
        assert_eq!(words, vec![0x1234, 0x00FF]);
    }

    #[test]
    fn test_parse_read_response_rejections() {
        let resp = read_response(1, 0x03, &[0x0001]);
        assert_eq!(
            parse_read_response(&resp, 2, FunctionCode::ReadHoldingRegisters, 1),
            Err(FrameError::Mismatch("slave id"))
        );
        assert_eq!(
            parse_read_response(&resp, 1, FunctionCode::ReadInputRegisters, 1),
            Err(FrameError::Mismatch("function code"))
        );
        assert!(matches!(
            parse_read_response(&resp[..5], 1, FunctionCode::ReadHoldingRegisters, 1),
            Err(FrameError::Truncated { expected: 7, actual: 5 })
        ));

        let mut corrupted = resp.clone();
        corrupted[6] ^= 0xFF;
        assert!(matches!(
            parse_read_response(&corrupted, 1, FunctionCode::ReadHoldingRegisters, 1),
            Err(FrameError::Crc { .. })
        ));
    }

    #[test]
    fn test_byte_count_mismatch() {
        let mut resp = read_response(1, 0x04, &[0x0001, 0x0002]);
        resp[2] = 2;
        assert_eq!(
            parse_read_response(&resp, 1, FunctionCode::ReadInputRegisters, 2),
            Err(FrameError::Mismatch("byte count"))
        );
    }

    #[test]
    fn test_check_write_response() {
        let request = build_rtu_write_multiple_registers(1, 2000, &[1, 2, 3]);
        let mut echo = request[..6].to_vec();
        checksum::append_crc(&mut echo);
        assert_eq!(check_write_response(&echo, &request), Ok(()));

        let mut wrong = request[..6].to_vec();
        wrong[3] = 0x03;
        checksum::append_crc(&mut wrong);
        assert_eq!(
            check_write_response(&wrong, &request),
            Err(FrameError::Mismatch("address or quantity"))
        );

        echo[7] ^= 0x01;
        assert!(matches!(check_write_response(&echo, &request), Err(FrameError::Crc { .. })));
    }

    #[test]
    fn test_parse_registers() {
        let data = vec![0x00, 0x64, 0x01, 0x2C]; // 100, 300
        let registers = parse_registers(&data);
        assert_eq!(registers, vec![100, 300]);
    }

    #[test]
    fn test_format_frame() {
        let request = build_rtu_request(1, FunctionCode::ReadInputRegisters, 2000, 6);
        let text = format_frame(&request);
        assert!(text.starts_with("RTU: Slave=01 Func=04 (Read Input Registers) Data=07d00006"));

        let mut exception = vec![0x01, 0x83, 0x02];
        checksum::append_crc(&mut exception);
        assert!(format_frame(&exception).contains("(Read Holding Registers exception)"));
        assert_eq!(format_frame(&[0x01, 0x04]), "RTU: short frame 0104");
    }

    #[test]
    fn test_function_code_lookup() {
        assert_eq!(FunctionCode::from_u8(0x10), Some(FunctionCode::WriteMultipleRegisters));
        assert_eq!(FunctionCode::from_u8(0x01), None);
        assert_eq!(FunctionCode::ReadInputRegisters.name(), "Read Input Registers");
    }
}
