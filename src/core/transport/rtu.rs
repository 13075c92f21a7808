//! Modbus RTU master over a half-duplex serial line

use super::serial::{open_port, SerialConfig};
use super::{ReadRegisters, TransportError, WriteRegisters};
use crate::core::codec::RegisterKind;
use crate::core::protocol::modbus::{
    format_frame, read_response_len, write_request_len, MAX_READ_RESPONSE,
    MAX_WRITE_REQUEST, WRITE_RESPONSE_LEN,
};
use crate::core::protocol::{
    build_rtu_request, build_rtu_write_multiple_registers, check_write_response,
    parse_read_response, FunctionCode,
};
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Minimum bytes for any response to count as received
const MIN_RESPONSE: usize = 5;

/// Modem line driving a direction input of the RS-485 transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionLine {
    /// Request To Send
    Rts,
    /// Data Terminal Ready
    Dtr,
}

impl std::str::FromStr for DirectionLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rts" => Ok(Self::Rts),
            "dtr" => Ok(Self::Dtr),
            other => Err(format!("unknown direction line '{other}', expected rts or dtr")),
        }
    }
}

/// RTU master settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuConfig {
    /// Slave address of the bus adapter
    pub slave_id: u8,
    /// Deadline for one request/response exchange
    pub timeout_ms: u64,
    /// Line raised while transmitting (driver enable)
    pub tx_enable: Option<DirectionLine>,
    /// Line raised while transmitting (receiver disable)
    pub rx_enable: Option<DirectionLine>,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            slave_id: 1,
            timeout_ms: 1200,
            tx_enable: None,
            rx_enable: None,
        }
    }
}

impl RtuConfig {
    /// Per-exchange deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Byte-level access to a half-duplex line
///
/// Implemented for `serialport` handles; tests substitute a scripted link.
pub trait RtuLink {
    /// Drop anything already waiting in the receive buffer
    fn discard_input(&mut self) -> io::Result<()>;

    /// Queue a whole frame for transmission
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Block until the queued frame has left the wire
    ///
    /// Fails with `TimedOut` when that took longer than `timeout`.
    fn drain(&mut self, timeout: Duration) -> io::Result<()>;

    /// Read what is available within `timeout`; `Ok(0)` means nothing arrived
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Drive a modem control line
    fn set_line(&mut self, line: DirectionLine, level: bool) -> io::Result<()>;
}

impl RtuLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)
    }

    fn drain(&mut self, timeout: Duration) -> io::Result<()> {
        let started = Instant::now();
        self.flush()?;
        if started.elapsed() > timeout {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "transmit drain"));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.set_timeout(timeout).map_err(io::Error::from)?;
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_line(&mut self, line: DirectionLine, level: bool) -> io::Result<()> {
        match line {
            DirectionLine::Rts => self.write_request_to_send(level),
            DirectionLine::Dtr => self.write_data_terminal_ready(level),
        }
        .map_err(io::Error::from)
    }
}

/// Modbus RTU master
///
/// One call is one exchange: a single deadline taken at entry covers the
/// transmit drain and the response collection. No retries are made.
pub struct RtuTransport<L: RtuLink = Box<dyn SerialPort>> {
    link: L,
    config: RtuConfig,
}

impl RtuTransport {
    /// Open the serial port and wrap it
    pub fn open(serial: &SerialConfig, config: RtuConfig) -> Result<Self, TransportError> {
        let port = open_port(serial, config.timeout())?;
        Self::new(port, config)
    }
}

impl<L: RtuLink> RtuTransport<L> {
    /// Wrap an open link; the line is left in receive direction
    pub fn new(link: L, config: RtuConfig) -> Result<Self, TransportError> {
        let mut transport = Self { link, config };
        transport.set_direction(false)?;
        tracing::info!(
            slave = transport.config.slave_id,
            timeout_ms = transport.config.timeout_ms,
            "rtu master ready"
        );
        Ok(transport)
    }

    /// Active settings
    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    /// Underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Underlying link, mutable
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn set_direction(&mut self, transmit: bool) -> io::Result<()> {
        for line in [self.config.tx_enable, self.config.rx_enable].into_iter().flatten() {
            self.link.set_line(line, transmit)?;
        }
        Ok(())
    }

    /// Send `request` and collect up to `expected` response bytes
    fn transceive(&mut self, request: &[u8], expected: usize) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + self.config.timeout();
        tracing::trace!("tx {}", format_frame(request));

        self.link.discard_input()?;
        let sent = self
            .set_direction(true)
            .and_then(|()| self.link.transmit(request))
            .and_then(|()| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.link.drain(remaining)
            });
        // Back to receive on every path before anything else is reported.
        let restored = self.set_direction(false);
        match sent {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::debug!(expected, "transmit drain overran the deadline");
                return Err(TransportError::Timeout {
                    expected,
                    received: 0,
                });
            }
            other => other?,
        }
        restored?;
        if Instant::now() >= deadline {
            return Err(TransportError::Timeout {
                expected,
                received: 0,
            });
        }

        let mut response = vec![0u8; expected];
        let mut total = 0;
        while total < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let n = self.link.receive(&mut response[total..], remaining)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        response.truncate(total);

        if total < MIN_RESPONSE {
            tracing::debug!(expected, received = total, "no response");
            return Err(TransportError::Timeout {
                expected,
                received: total,
            });
        }
        tracing::trace!("rx {}", format_frame(&response));
        Ok(response)
    }
}

impl<L: RtuLink> ReadRegisters for RtuTransport<L> {
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError> {
        if out.is_empty() {
            return Err(TransportError::InvalidArgument("register count is zero"));
        }
        let count = u16::try_from(out.len()).map_err(|_| TransportError::InvalidSize(out.len()))?;
        let expected = read_response_len(count);
        if expected > MAX_READ_RESPONSE {
            return Err(TransportError::InvalidSize(expected));
        }

        let function = match kind {
            RegisterKind::Holding => FunctionCode::ReadHoldingRegisters,
            RegisterKind::Input => FunctionCode::ReadInputRegisters,
        };
        let request = build_rtu_request(self.config.slave_id, function, address, count);
        let response = self.transceive(&request, expected)?;
        let words = parse_read_response(&response, self.config.slave_id, function, count)?;
        out.copy_from_slice(&words);
        tracing::debug!(%kind, address, count, "read ok");
        Ok(())
    }
}

impl<L: RtuLink> WriteRegisters for RtuTransport<L> {
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        if words.is_empty() {
            return Err(TransportError::InvalidArgument("register count is zero"));
        }
        let request_len = write_request_len(words.len());
        if request_len > MAX_WRITE_REQUEST {
            return Err(TransportError::InvalidSize(request_len));
        }

        let request = build_rtu_write_multiple_registers(self.config.slave_id, address, words);
        let response = self.transceive(&request, WRITE_RESPONSE_LEN)?;
        check_write_response(&response, &request)?;
        tracing::debug!(address, count = words.len(), "write ok");
        Ok(())
    }
}
