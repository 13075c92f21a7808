//! Register gateway
//!
//! Owns the 64 unit slots, mirrors their registers and applies commands with
//! a read-modify-write protocol, since the bus only accepts whole holding
//! blocks.
//!
//! A command runs in two phases. `prepare_write` refreshes the holding image
//! when it cannot be trusted, overwrites it from the status mirror and pushes
//! that baseline if it changed. The command then edits one status field and
//! `commit_write` layers it into holding and writes the block.

mod clock;
mod command;
mod report;
mod unit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandError};
pub use report::{ErrorReport, UnitReport};
pub use unit::Unit;

use crate::core::codec::{
    ErrorBlock, FanDirection, FanSpeed, HoldingBlock, Mode, RegisterBlock, SystemStatus, MAX_UNITS,
};
use crate::core::transport::{ReadRegisters, TransportError, WriteRegisters};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Bus operation failed
    #[error(transparent)]
    Bus(#[from] TransportError),

    /// Index outside the slot table
    #[error("unit index {0} out of range (0-63)")]
    InvalidUnit(u8),

    /// Slot not found by the last discovery
    #[error("unit {0} not present")]
    UnitNotPresent(u8),
}

/// Gateway result type
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Timing tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Seconds between status polls
    pub poll_interval_s: u32,
    /// Minimum spacing between bus operations
    pub throttle_ms: u32,
    /// Seconds a holding read or write is trusted
    pub cache_write_s: u32,
    /// Seconds an error read is trusted
    pub cache_error_s: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 10,
            throttle_ms: 25,
            cache_write_s: 35,
            cache_error_s: 10,
        }
    }
}

/// Outcome of one poll pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Status blocks refreshed
    pub polled: usize,
    /// Present units left alone inside the write-cache window
    pub skipped: usize,
    /// Status reads that failed
    pub failed: usize,
}

/// Throttled access to the bus
struct BusLink<B, C> {
    bus: B,
    clock: C,
    throttle_ms: u64,
    last_op: Option<u64>,
}

impl<B: ReadRegisters + WriteRegisters, C: Clock> BusLink<B, C> {
    fn throttle(&self) {
        let Some(last) = self.last_op else {
            return;
        };
        let elapsed = self.clock.now_ms().saturating_sub(last);
        if elapsed < self.throttle_ms {
            self.clock
                .sleep(Duration::from_millis(self.throttle_ms - elapsed));
        }
    }

    fn read<K: RegisterBlock>(&mut self, block: &mut K, index: u8) -> std::result::Result<(), TransportError> {
        self.throttle();
        let kind = K::KIND;
        let address = K::address(index);
        let result = self.bus.read_registers(kind, address, block.words_mut());
        self.last_op = Some(self.clock.now_ms());
        tracing::debug!(%kind, address, ok = result.is_ok(), "bus read");
        result
    }

    fn write(&mut self, holding: &HoldingBlock, index: u8) -> std::result::Result<(), TransportError> {
        self.throttle();
        let address = HoldingBlock::address(index);
        let result = self.bus.write_registers(address, holding.words());
        self.last_op = Some(self.clock.now_ms());
        tracing::debug!(address, ok = result.is_ok(), "bus write");
        result
    }

    fn write_if_dirty(&mut self, holding: &mut HoldingBlock, index: u8, now: u64) -> Result<()> {
        if !holding.is_dirty() {
            return Ok(());
        }
        self.write(holding, index)?;
        holding.mark_written(now);
        Ok(())
    }
}

/// Gateway over one register bus
pub struct Gateway<B, C = SystemClock> {
    link: BusLink<B, C>,
    device_id: u8,
    config: GatewayConfig,
    system: SystemStatus,
    units: Vec<Unit>,
    discovered: usize,
}

impl<B: ReadRegisters + WriteRegisters> Gateway<B, SystemClock> {
    /// Gateway on the system clock with default tunables
    pub fn new(bus: B, device_id: u8) -> Self {
        Self::with_clock(bus, SystemClock::new(), device_id, GatewayConfig::default())
    }
}

impl<B: ReadRegisters + WriteRegisters, C: Clock> Gateway<B, C> {
    /// Gateway with an explicit clock and tunables
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_clock(bus: B, clock: C, device_id: u8, config: GatewayConfig) -> Self {
        let units = (0..MAX_UNITS).map(|i| Unit::new(i as u8)).collect();
        Self {
            link: BusLink {
                bus,
                clock,
                throttle_ms: u64::from(config.throttle_ms),
                last_op: None,
            },
            device_id,
            config,
            system: SystemStatus::default(),
            units,
            discovered: 0,
        }
    }

    /// Bus address of the adapter this gateway talks to
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Active tunables
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Last system status snapshot
    pub fn system_status(&self) -> &SystemStatus {
        &self.system
    }

    /// All 64 slots
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Slots marked present
    pub fn present_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| u.is_present())
    }

    /// One slot
    pub fn unit(&self, index: u8) -> Result<&Unit> {
        self.units
            .get(usize::from(index))
            .ok_or(GatewayError::InvalidUnit(index))
    }

    /// Units found by the last discovery
    pub fn discovered_count(&self) -> usize {
        self.discovered
    }

    /// Underlying bus
    pub fn bus(&self) -> &B {
        &self.link.bus
    }

    /// Underlying bus, mutable
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.link.bus
    }

    /// Clock driving throttling and cache windows
    pub fn clock(&self) -> &C {
        &self.link.clock
    }

    /// Scan all slots
    ///
    /// Every slot is reset, pending holding edits included. A slot becomes
    /// present when it is connected, not in error and both its capability and
    /// status reads succeed. Only the system status read can fail the pass.
    pub fn discover_units(&mut self) -> Result<usize> {
        self.link.read(&mut self.system, 0)?;

        self.discovered = 0;
        for unit in &mut self.units {
            unit.reset();
            let index = unit.index;
            let slot = usize::from(index);
            if !self.system.unit_connected(slot) || self.system.unit_error(slot) {
                continue;
            }

            if let Err(e) = self.link.read(&mut unit.capability, index) {
                tracing::warn!("cap read failed for unit {}: {}", index, e);
                continue;
            }
            if let Err(e) = self.link.read(&mut unit.status, index) {
                tracing::warn!("status read failed for unit {}: {}", index, e);
                continue;
            }
            unit.present = true;
            self.discovered += 1;
        }

        tracing::info!("discovered {} units", self.discovered);
        Ok(self.discovered)
    }

    /// Refresh the status of every present unit
    ///
    /// Units written within the write-cache window are skipped. Failures are
    /// logged per unit and never stop the pass.
    pub fn poll_status(&mut self) -> PollSummary {
        let now = self.link.clock.now_ms();
        let mut summary = PollSummary::default();

        for unit in self.units.iter_mut().filter(|u| u.present) {
            if unit.holding.write_within(now, self.config.cache_write_s) {
                summary.skipped += 1;
                continue;
            }
            match self.link.read(&mut unit.status, unit.index) {
                Ok(()) => summary.polled += 1,
                Err(e) => {
                    tracing::warn!("status poll failed for unit {}: {}", unit.index, e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Read a unit's error block unless the cached copy is fresh
    pub fn read_error(&mut self, index: u8) -> Result<&ErrorBlock> {
        let now = self.link.clock.now_ms();
        let cache_ms = u64::from(self.config.cache_error_s) * 1000;
        let unit = Self::present_mut(&mut self.units, index)?;

        let fresh = unit
            .last_error_read
            .is_some_and(|t| now.saturating_sub(t) < cache_ms);
        if !fresh {
            self.link.read(&mut unit.error, index)?;
            unit.last_error_read = Some(now);
        }
        Ok(&unit.error)
    }

    /// Bring the holding image to a trusted baseline before a command
    pub fn prepare_write(&mut self, index: u8) -> Result<()> {
        let now = self.link.clock.now_ms();
        let window = self.config.cache_write_s;
        let unit = Self::present_mut(&mut self.units, index)?;
        let holding = &unit.holding;

        let reload = holding.last_read().is_none()
            || (!holding.is_dirty()
                && !holding.read_within(now, window)
                && !holding.write_within(now, window));
        if !reload {
            return Ok(());
        }

        self.link.read(&mut unit.holding, index)?;
        unit.holding.mark_read(now);
        unit.holding.sync_from_status(&unit.status);
        self.link.write_if_dirty(&mut unit.holding, index, now)
    }

    /// Layer the status mirror into holding and write it
    ///
    /// A raised filter reset is cleared and written again so the device sees
    /// a pulse.
    pub fn commit_write(&mut self, index: u8) -> Result<()> {
        let now = self.link.clock.now_ms();
        let unit = Self::present_mut(&mut self.units, index)?;

        unit.holding.sync_from_status(&unit.status);
        self.link.write_if_dirty(&mut unit.holding, index, now)?;

        if unit.holding.filter_reset() {
            unit.holding.set_filter_reset(false);
            self.link.write_if_dirty(&mut unit.holding, index, now)?;
        }
        Ok(())
    }

    /// Switch a unit on or off
    pub fn set_power(&mut self, index: u8, on: bool) -> Result<()> {
        self.apply(index, Command::Power(on))
    }

    /// Select an operating mode, switching the unit on
    pub fn set_mode(&mut self, index: u8, mode: Mode) -> Result<()> {
        self.apply(index, Command::Mode(mode))
    }

    /// Set the target temperature
    pub fn set_setpoint(&mut self, index: u8, celsius: f32) -> Result<()> {
        self.apply(index, Command::Setpoint(celsius))
    }

    /// Set the fan speed
    pub fn set_fan_speed(&mut self, index: u8, speed: FanSpeed) -> Result<()> {
        self.apply(index, Command::FanSpeed(speed))
    }

    /// Set the louvre position
    pub fn set_fan_direction(&mut self, index: u8, direction: FanDirection) -> Result<()> {
        self.apply(index, Command::FanDirection(direction))
    }

    /// Pulse the filter-sign reset
    pub fn filter_reset(&mut self, index: u8) -> Result<()> {
        self.apply(index, Command::FilterReset)
    }

    /// Run one command through prepare, edit, commit
    pub fn apply(&mut self, index: u8, command: Command) -> Result<()> {
        self.prepare_write(index)?;

        let unit = Self::present_mut(&mut self.units, index)?;
        let status = &mut unit.status;
        match command {
            Command::Power(on) => status.set_power(on),
            Command::Mode(mode) => {
                status.set_power(true);
                status.set_mode(mode);
            }
            Command::Setpoint(celsius) => status.set_setpoint(celsius),
            Command::FanSpeed(speed) => status.set_fan_speed(speed),
            Command::FanDirection(direction) => status.set_fan_direction(direction),
            Command::FilterReset => unit.holding.set_filter_reset(true),
        }

        self.commit_write(index)?;
        tracing::debug!("unit {} {}", index, command);
        Ok(())
    }

    fn present_mut(units: &mut [Unit], index: u8) -> Result<&mut Unit> {
        let unit = units
            .get_mut(usize::from(index))
            .ok_or(GatewayError::InvalidUnit(index))?;
        if !unit.present {
            return Err(GatewayError::UnitNotPresent(index));
        }
        Ok(unit)
    }
}
