//! Core module containing the main functionality of the bridge
//!
//! This module provides:
//! - Register codec for the D3Net block layouts
//! - Modbus RTU framing and CRC
//! - Serial transport with RS-485 direction control
//! - Gateway model: discovery, polling and the write protocol
//! - Simulated register bus
//! - Log ring
//! - Bridge service with lock-guarded background tasks

pub mod bridge;
pub mod codec;
pub mod gateway;
pub mod logger;
pub mod protocol;
pub mod simulator;
pub mod transport;
