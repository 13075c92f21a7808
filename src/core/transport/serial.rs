//! Serial port access

use super::TransportError;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt;
use std::time::Duration;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    None,
    /// Odd parity
    Odd,
    /// Even parity
    #[default]
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity '{other}', expected n, e or o")),
        }
    }
}

impl fmt::Display for SerialParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "N"),
            Self::Odd => write!(f, "O"),
            Self::Even => write!(f, "E"),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
}

impl SerialConfig {
    /// Create a new serial configuration with the bus defaults (8E1)
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::Even,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Human-readable summary, e.g. `/dev/ttyUSB0 @ 9600 baud (8E1)`
    pub fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port, self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM1" } else { "/dev/ttyUSB0" };
        Self::new(port, 9600)
    }
}

/// Open the configured port with an initial read timeout
pub fn open_port(
    config: &SerialConfig,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, TransportError> {
    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };

    let stop_bits = match config.stop_bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    };

    let parity = match config.parity {
        SerialParity::Odd => Parity::Odd,
        SerialParity::Even => Parity::Even,
        SerialParity::None => Parity::None,
    };

    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
            serialport::ErrorKind::Io(io_kind) => match io_kind {
                std::io::ErrorKind::NotFound => TransportError::PortNotFound(config.port.clone()),
                std::io::ErrorKind::PermissionDenied => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            },
            _ => TransportError::ConnectionFailed(e.to_string()),
        })?;

    tracing::info!("opened {}", config.connection_info());
    Ok(port)
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}
