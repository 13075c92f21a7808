//! Protocol implementations
//!
//! Modbus RTU framing and the CRC-16 it relies on.

pub mod checksum;
pub mod modbus;

pub use checksum::crc16_modbus;
pub use modbus::{
    build_rtu_request, build_rtu_write_multiple_registers, check_write_response,
    parse_read_response, FrameError, FunctionCode,
};
