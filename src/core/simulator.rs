//! Simulated register bus
//!
//! An in-memory D3Net adapter for tests, demos and `--simulate` runs. Input
//! and holding registers live in sparse maps, every operation is logged, and
//! reads or writes at a given address can be made to fail. A holding block
//! write is reflected into the unit's status block the way an indoor unit
//! reports an accepted command.

use crate::core::codec::field::{
    CURRENT_MODE, FAN_DIRECTION, FAN_SPEED, FILTER, MODE, POWER, ROOM_TEMPERATURE, SETPOINT,
};
use crate::core::codec::{
    bit_get, bit_set, temperature_get, temperature_set, uint_get, uint_set, CapabilityBlock, ErrorBlock,
    HoldingBlock, RegisterBlock, RegisterKind, StatusBlock, SystemStatus, MAX_UNITS,
};
use crate::core::transport::{ReadRegisters, TransportError, WriteRegisters};
use serde::Serialize;
use std::collections::HashMap;

/// One recorded bus operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BusOp {
    /// Register read
    Read {
        /// Register table
        kind: RegisterKind,
        /// Start address
        address: u16,
        /// Register count
        count: usize,
    },
    /// Holding register write
    Write {
        /// Start address
        address: u16,
        /// Words written
        words: Vec<u16>,
    },
}

impl BusOp {
    /// Operation is a write
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Failure returned by an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No response before the deadline
    Timeout,
    /// Response with a bad CRC
    Crc,
    /// Response echoing the wrong header
    Framing,
}

impl Fault {
    fn to_error(self, expected: usize) -> TransportError {
        match self {
            Self::Timeout => TransportError::Timeout {
                expected,
                received: 0,
            },
            Self::Crc => TransportError::CrcMismatch {
                calculated: 0x0000,
                received: 0xFFFF,
            },
            Self::Framing => TransportError::Framing("slave id"),
        }
    }
}

/// In-memory register device
#[derive(Debug, Default)]
pub struct SimulatedBus {
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    ops: Vec<BusOp>,
    read_faults: HashMap<(RegisterKind, u16), Fault>,
    write_faults: HashMap<u16, Fault>,
}

impl SimulatedBus {
    /// Empty bus: no units, adapter not initialised
    pub fn new() -> Self {
        Self::default()
    }

    /// A small installation for demos: four units across two groups
    pub fn demo() -> Self {
        let mut bus = Self::new();
        bus.set_initialized(true);
        for (index, on, mode, setpoint, room) in [
            (0u8, true, 2u32, 24.0f32, 26.5f32),
            (1, false, 1, 21.0, 19.5),
            (5, true, 3, 22.5, 22.0),
            (17, true, 0, 20.0, 23.0),
        ] {
            let mut status = StatusBlock::default();
            let words = status.words_mut();
            bit_set(words, POWER, on);
            uint_set(words, MODE.0, MODE.1, mode);
            uint_set(words, CURRENT_MODE.0, CURRENT_MODE.1, mode);
            temperature_set(words, SETPOINT.0, SETPOINT.1, setpoint);
            temperature_set(words, ROOM_TEMPERATURE.0, ROOM_TEMPERATURE.1, room);
            bus.add_unit(index, &demo_capability(), &status);
        }
        bus
    }

    /// Attach a unit: mark it connected and load its capability and status
    pub fn add_unit(&mut self, index: u8, capability: &CapabilityBlock, status: &StatusBlock) {
        let mut system: SystemStatus = self.block(0);
        bit_set(system.words_mut(), 16 + usize::from(index), true);
        self.set_block(0, &system);
        self.set_block(index, capability);
        self.set_block(index, status);
    }

    /// Raise or clear a slot's error bit in the system status
    pub fn set_unit_error(&mut self, index: u8, error: bool) {
        let mut system: SystemStatus = self.block(0);
        bit_set(system.words_mut(), 80 + usize::from(index), error);
        self.set_block(0, &system);
    }

    /// Set the adapter-initialised flag
    pub fn set_initialized(&mut self, initialized: bool) {
        let mut system: SystemStatus = self.block(0);
        bit_set(system.words_mut(), 0, initialized);
        self.set_block(0, &system);
    }

    /// Load an error block for a unit
    pub fn set_error(&mut self, index: u8, error: &ErrorBlock) {
        self.set_block(index, error);
    }

    /// Store a block at its place in the register map
    pub fn set_block<K: RegisterBlock>(&mut self, index: u8, block: &K) {
        let base = K::address(index);
        let map = self.map_mut(K::KIND);
        for (offset, &word) in (0u16..).zip(block.words()) {
            map.insert(base + offset, word);
        }
    }

    /// Load a block from the register map; unset registers read as zero
    pub fn block<K: RegisterBlock + Default>(&self, index: u8) -> K {
        let base = K::address(index);
        let map = self.map(K::KIND);
        let mut block = K::default();
        for (offset, word) in (0u16..).zip(block.words_mut()) {
            *word = map.get(&(base + offset)).copied().unwrap_or(0);
        }
        block
    }

    /// Change a unit's room temperature
    pub fn set_room_temperature(&mut self, index: u8, celsius: f32) {
        let mut status: StatusBlock = self.block(index);
        temperature_set(status.words_mut(), ROOM_TEMPERATURE.0, ROOM_TEMPERATURE.1, celsius);
        self.set_block(index, &status);
    }

    /// Fail every read of `kind` starting at `address`
    pub fn fail_reads(&mut self, kind: RegisterKind, address: u16, fault: Fault) {
        self.read_faults.insert((kind, address), fault);
    }

    /// Fail every write starting at `address`
    pub fn fail_writes(&mut self, address: u16, fault: Fault) {
        self.write_faults.insert(address, fault);
    }

    /// Remove all injected faults
    pub fn clear_faults(&mut self) {
        self.read_faults.clear();
        self.write_faults.clear();
    }

    /// Operations in the order they were issued, failed ones included
    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    /// Forget recorded operations
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Recorded writes as `(address, words)`
    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write { address, words } => Some((*address, words.clone())),
                BusOp::Read { .. } => None,
            })
            .collect()
    }

    fn map(&self, kind: RegisterKind) -> &HashMap<u16, u16> {
        match kind {
            RegisterKind::Input => &self.input,
            RegisterKind::Holding => &self.holding,
        }
    }

    fn map_mut(&mut self, kind: RegisterKind) -> &mut HashMap<u16, u16> {
        match kind {
            RegisterKind::Input => &mut self.input,
            RegisterKind::Holding => &mut self.holding,
        }
    }

    /// Reflect an accepted holding block into the unit's status
    fn apply_holding(&mut self, index: u8) {
        let holding: HoldingBlock = self.block(index);
        let mut status: StatusBlock = self.block(index);
        let (src, dst) = (holding.words(), status.words_mut());

        bit_set(dst, POWER, bit_get(src, POWER));
        for (start, length) in [FAN_DIRECTION, FAN_SPEED, MODE] {
            uint_set(dst, start, length, uint_get(src, start, length));
        }
        uint_set(dst, CURRENT_MODE.0, CURRENT_MODE.1, uint_get(src, MODE.0, MODE.1));
        temperature_set(dst, SETPOINT.0, SETPOINT.1, temperature_get(src, SETPOINT.0, SETPOINT.1));
        if uint_get(src, FILTER.0, FILTER.1) != 0 {
            uint_set(dst, FILTER.0, FILTER.1, 0);
        }
        self.set_block(index, &status);
    }
}

fn demo_capability() -> CapabilityBlock {
    let mut capability = CapabilityBlock::default();
    let words = capability.words_mut();
    for bit in [0, 1, 2, 3, 4, 11, 15] {
        bit_set(words, bit, true);
    }
    uint_set(words, 8, 3, 5);
    uint_set(words, 12, 3, 3);
    // cool 18..32, heat 16..30
    uint_set(words, 16, 8, 32);
    uint_set(words, 24, 8, 18);
    uint_set(words, 32, 8, 30);
    uint_set(words, 40, 8, 16);
    capability
}

impl ReadRegisters for SimulatedBus {
    fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError> {
        self.ops.push(BusOp::Read {
            kind,
            address,
            count: out.len(),
        });
        if out.is_empty() {
            return Err(TransportError::InvalidArgument("register count is zero"));
        }
        if let Some(fault) = self.read_faults.get(&(kind, address)) {
            return Err(fault.to_error(5 + 2 * out.len()));
        }

        let map = self.map(kind);
        for (offset, word) in (0u16..).zip(out.iter_mut()) {
            *word = map.get(&address.wrapping_add(offset)).copied().unwrap_or(0);
        }
        Ok(())
    }
}

impl WriteRegisters for SimulatedBus {
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        self.ops.push(BusOp::Write {
            address,
            words: words.to_vec(),
        });
        if words.is_empty() {
            return Err(TransportError::InvalidArgument("register count is zero"));
        }
        if let Some(fault) = self.write_faults.get(&address) {
            return Err(fault.to_error(8));
        }

        for (offset, &word) in (0u16..).zip(words) {
            self.holding.insert(address.wrapping_add(offset), word);
        }

        let base = HoldingBlock::address(0);
        let span = HoldingBlock::COUNT;
        if address >= base && (address - base) % span == 0 && words.len() == usize::from(span) {
            let index = (address - base) / span;
            if usize::from(index) < MAX_UNITS {
                #[allow(clippy::cast_possible_truncation)]
                self.apply_holding(index as u8);
            }
        }
        Ok(())
    }
}
