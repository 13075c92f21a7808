//! Transport layer
//!
//! Supports:
//! - Serial ports (RS-485 adapters, RS-232 with a direction-switching converter)
//! - Modbus RTU master over a half-duplex line
//!
//! The gateway only sees the [`ReadRegisters`] and [`WriteRegisters`]
//! capabilities, so any register source can stand in for the RTU master.

mod rtu;
mod serial;

pub use rtu::{DirectionLine, RtuConfig, RtuLink, RtuTransport};
pub use serial::{list_ports, open_port, SerialConfig, SerialParity};

use crate::core::codec::RegisterKind;
use crate::core::protocol::FrameError;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rejected before any bus activity
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Request or response would exceed the frame buffer
    #[error("Invalid size: {0} bytes")]
    InvalidSize(usize),

    /// Deadline passed before the full response arrived
    #[error("Timeout: received {received} of {expected} bytes")]
    Timeout {
        /// Bytes the response needs
        expected: usize,
        /// Bytes collected before the deadline
        received: usize,
    },

    /// Response header does not match the request
    #[error("Framing error: {0}")]
    Framing(&'static str),

    /// Response CRC does not match its body
    #[error("CRC mismatch: calculated {calculated:04X}, received {received:04X}")]
    CrcMismatch {
        /// CRC over the received body
        calculated: u16,
        /// CRC carried by the frame
        received: u16,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Truncated { expected, actual } => Self::Timeout {
                expected,
                received: actual,
            },
            FrameError::Mismatch(what) => Self::Framing(what),
            FrameError::Crc {
                calculated,
                received,
            } => Self::CrcMismatch {
                calculated,
                received,
            },
        }
    }
}

/// Read a run of registers
pub trait ReadRegisters {
    /// Fill `out` with `out.len()` registers starting at `address`
    ///
    /// `out` is only written when the whole read succeeds.
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError>;
}

/// Write a run of holding registers
pub trait WriteRegisters {
    /// Write `words` to consecutive holding registers starting at `address`
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError>;
}

/// Both register capabilities, for trait objects
pub trait RegisterBus: ReadRegisters + WriteRegisters {}

impl<T: ReadRegisters + WriteRegisters + ?Sized> RegisterBus for T {}

impl<T: ReadRegisters + ?Sized> ReadRegisters for Box<T> {
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError> {
        (**self).read_registers(kind, address, out)
    }
}

impl<T: WriteRegisters + ?Sized> WriteRegisters for Box<T> {
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        (**self).write_registers(address, words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_mapping() {
        let err: TransportError = FrameError::Crc {
            calculated: 1,
            received: 2,
        }
        .into();
        assert!(matches!(err, TransportError::CrcMismatch { calculated: 1, received: 2 }));

        let err: TransportError = FrameError::Mismatch("slave id").into();
        assert!(matches!(err, TransportError::Framing("slave id")));

        let err: TransportError = FrameError::Truncated { expected: 17, actual: 3 }.into();
        assert_eq!(err.to_string(), "Timeout: received 3 of 17 bytes");
    }
}
