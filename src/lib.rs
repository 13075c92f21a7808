//! # D3Net Bridge Core Library
//!
//! Talks to a D3Net HVAC gateway over a Modbus RTU (RS-485) link and exposes
//! its indoor units to supervisory code:
//! - Register codec for capability, status, holding and error blocks
//! - Modbus RTU framing with CRC-16 and half-duplex direction control
//! - Gateway model with discovery, cached polling and write protocol
//! - Bridge service sharing one gateway between a poller, a status reporter
//!   and command callers
//! - In-memory log ring for incremental log readers
//! - Simulated bus for tests and demos
//!
//! ## Example
//!
//! ```rust,no_run
//! use d3net_core::{Gateway, Mode, SimulatedBus};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut gateway = Gateway::new(SimulatedBus::demo(), 1);
//!     gateway.discover_units()?;
//!
//!     gateway.set_mode(5, Mode::Cool)?;
//!     gateway.set_setpoint(5, 23.5)?;
//!
//!     for unit in gateway.present_units() {
//!         println!("{} {:.1}", unit.id(), unit.status().room_temperature());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, LoggingConfig};
pub use crate::core::bridge::{Bridge, BridgeConfig, BridgeError, PollOutcome};
pub use crate::core::codec::{FanDirection, FanSpeed, Mode};
pub use crate::core::gateway::{
    Command, ErrorReport, Gateway, GatewayConfig, GatewayError, UnitReport,
};
pub use crate::core::logger::{LogLine, LogRing};
pub use crate::core::simulator::SimulatedBus;
pub use crate::core::transport::{RtuConfig, RtuTransport, SerialConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
