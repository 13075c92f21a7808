//! Typed views over the five register groups

use super::types::{FanDirection, FanSpeed, Mode, RegisterKind};
use super::{
    bit_get, bit_set, sint_get, temperature_get, temperature_set, uint_get, uint_set,
};
use serde::Serialize;

/// Number of unit slots on the bus
pub const MAX_UNITS: usize = 64;

/// A fixed-size register group with a known place in the register map
pub trait RegisterBlock {
    /// Register table
    const KIND: RegisterKind;
    /// Address of the block for unit 0
    const BASE: u16;
    /// Words per block
    const COUNT: u16;

    /// Raw words
    fn words(&self) -> &[u16];

    /// Raw words, mutable
    fn words_mut(&mut self) -> &mut [u16];

    /// Start address of the block belonging to `index`
    fn address(index: u8) -> u16 {
        Self::BASE + u16::from(index) * Self::COUNT
    }
}

macro_rules! plain_block {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $base:expr, $count:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            words: [u16; $count],
        }

        impl $name {
            /// Wrap raw words
            pub fn from_words(words: [u16; $count]) -> Self {
                Self { words }
            }
        }

        impl RegisterBlock for $name {
            const KIND: RegisterKind = $kind;
            const BASE: u16 = $base;
            #[allow(clippy::cast_possible_truncation)]
            const COUNT: u16 = $count as u16;

            fn words(&self) -> &[u16] {
                &self.words
            }

            fn words_mut(&mut self) -> &mut [u16] {
                &mut self.words
            }
        }
    };
}

plain_block!(
    /// Bus-wide status: initialisation, other master, per-slot connected/error bitmaps
    SystemStatus,
    RegisterKind::Input,
    0,
    9
);

plain_block!(
    /// Per-unit capability block, read once at discovery
    CapabilityBlock,
    RegisterKind::Input,
    1000,
    3
);

plain_block!(
    /// Per-unit live status
    StatusBlock,
    RegisterKind::Input,
    2000,
    6
);

plain_block!(
    /// Per-unit error block
    ErrorBlock,
    RegisterKind::Input,
    3600,
    2
);

impl SystemStatus {
    /// Gateway adapter finished initialising
    pub fn initialized(&self) -> bool {
        bit_get(&self.words, 0)
    }

    /// Another master is present on the bus
    pub fn other_master(&self) -> bool {
        bit_get(&self.words, 1)
    }

    /// Slot `index` has a unit attached
    pub fn unit_connected(&self, index: usize) -> bool {
        index < MAX_UNITS && bit_get(&self.words, 16 + index)
    }

    /// Slot `index` reports a communication error
    pub fn unit_error(&self, index: usize) -> bool {
        index < MAX_UNITS && bit_get(&self.words, 80 + index)
    }

    /// Slots that are connected and not in error
    pub fn healthy_units(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_UNITS).filter(|&i| self.unit_connected(i) && !self.unit_error(i))
    }
}

/// Decoded capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capability {
    /// Fan mode supported
    pub fan: bool,
    /// Cool mode supported
    pub cool: bool,
    /// Heat mode supported
    pub heat: bool,
    /// Auto mode supported
    pub auto: bool,
    /// Dry mode supported
    pub dry: bool,
    /// Fan direction control supported
    pub fan_direction: bool,
    /// Number of louvre positions
    pub fan_direction_steps: u8,
    /// Fan speed control supported
    pub fan_speed: bool,
    /// Number of fan speed steps
    pub fan_speed_steps: u8,
    /// Cooling setpoint limits (lower, upper), whole degrees
    pub cool_setpoint: (i8, i8),
    /// Heating setpoint limits (lower, upper), whole degrees
    pub heat_setpoint: (i8, i8),
}

#[allow(clippy::cast_possible_truncation)]
impl CapabilityBlock {
    /// Fan mode supported
    pub fn mode_fan(&self) -> bool {
        bit_get(&self.words, 0)
    }

    /// Cool mode supported
    pub fn mode_cool(&self) -> bool {
        bit_get(&self.words, 1)
    }

    /// Heat mode supported
    pub fn mode_heat(&self) -> bool {
        bit_get(&self.words, 2)
    }

    /// Auto mode supported
    pub fn mode_auto(&self) -> bool {
        bit_get(&self.words, 3)
    }

    /// Dry mode supported
    pub fn mode_dry(&self) -> bool {
        bit_get(&self.words, 4)
    }

    /// Fan direction control supported
    pub fn fan_direction(&self) -> bool {
        bit_get(&self.words, 11)
    }

    /// Louvre position count
    pub fn fan_direction_steps(&self) -> u8 {
        uint_get(&self.words, 8, 3) as u8
    }

    /// Fan speed control supported
    pub fn fan_speed(&self) -> bool {
        bit_get(&self.words, 15)
    }

    /// Fan speed step count
    pub fn fan_speed_steps(&self) -> u8 {
        uint_get(&self.words, 12, 3) as u8
    }

    /// Highest cooling setpoint
    pub fn cool_setpoint_upper(&self) -> i8 {
        sint_get(&self.words, 16, 8) as i8
    }

    /// Lowest cooling setpoint
    pub fn cool_setpoint_lower(&self) -> i8 {
        sint_get(&self.words, 24, 8) as i8
    }

    /// Highest heating setpoint
    pub fn heat_setpoint_upper(&self) -> i8 {
        sint_get(&self.words, 32, 8) as i8
    }

    /// Lowest heating setpoint
    pub fn heat_setpoint_lower(&self) -> i8 {
        sint_get(&self.words, 40, 8) as i8
    }

    /// All capability fields at once
    pub fn decode(&self) -> Capability {
        Capability {
            fan: self.mode_fan(),
            cool: self.mode_cool(),
            heat: self.mode_heat(),
            auto: self.mode_auto(),
            dry: self.mode_dry(),
            fan_direction: self.fan_direction(),
            fan_direction_steps: self.fan_direction_steps(),
            fan_speed: self.fan_speed(),
            fan_speed_steps: self.fan_speed_steps(),
            cool_setpoint: (self.cool_setpoint_lower(), self.cool_setpoint_upper()),
            heat_setpoint: (self.heat_setpoint_lower(), self.heat_setpoint_upper()),
        }
    }
}

/// Bit positions shared by the status and holding blocks, as `(start, length)`
pub(crate) mod field {
    pub const POWER: usize = 0;
    pub const FAN_CONTROL: (usize, u8) = (4, 4);
    pub const FAN_CONTROL_ENABLED: u32 = 6;
    pub const FAN_DIRECTION: (usize, u8) = (8, 3);
    pub const FAN_SPEED: (usize, u8) = (12, 3);
    pub const MODE: (usize, u8) = (16, 4);
    pub const FILTER: (usize, u8) = (20, 4);
    pub const FILTER_RESET_ON: u32 = 15;
    pub const CURRENT_MODE: (usize, u8) = (24, 4);
    pub const SETPOINT: (usize, u8) = (32, 16);
    pub const ROOM_TEMPERATURE: (usize, u8) = (64, 16);
}

use field::{
    CURRENT_MODE, FAN_CONTROL, FAN_CONTROL_ENABLED, FAN_DIRECTION, FAN_SPEED, FILTER,
    FILTER_RESET_ON, MODE, POWER, ROOM_TEMPERATURE, SETPOINT,
};

// Status setters are local edits layered into holding by sync; the change flag is not needed.
impl StatusBlock {
    /// Unit is on
    pub fn power(&self) -> bool {
        bit_get(&self.words, POWER)
    }

    /// Set power
    pub fn set_power(&mut self, on: bool) {
        bit_set(&mut self.words, POWER, on);
    }

    /// Heating active
    pub fn heat(&self) -> bool {
        bit_get(&self.words, 6)
    }

    /// Thermostat demand active
    pub fn thermo(&self) -> bool {
        bit_get(&self.words, 7)
    }

    /// Defrost cycle running
    pub fn defrost(&self) -> bool {
        bit_get(&self.words, 29)
    }

    /// Raw selected mode code
    pub fn mode_code(&self) -> u32 {
        uint_get(&self.words, MODE.0, MODE.1)
    }

    /// Selected operating mode
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_code(self.mode_code())
    }

    /// Select operating mode
    pub fn set_mode(&mut self, mode: Mode) {
        uint_set(&mut self.words, MODE.0, MODE.1, mode.code());
    }

    /// Mode the unit is actually running in
    pub fn current_mode(&self) -> Option<Mode> {
        Mode::from_code(uint_get(&self.words, CURRENT_MODE.0, CURRENT_MODE.1))
    }

    /// Raw fan speed code
    pub fn fan_speed_code(&self) -> u32 {
        uint_get(&self.words, FAN_SPEED.0, FAN_SPEED.1)
    }

    /// Fan speed
    pub fn fan_speed(&self) -> Option<FanSpeed> {
        FanSpeed::from_code(self.fan_speed_code())
    }

    /// Set fan speed
    pub fn set_fan_speed(&mut self, speed: FanSpeed) {
        uint_set(&mut self.words, FAN_SPEED.0, FAN_SPEED.1, speed.code());
    }

    /// Raw fan direction code
    pub fn fan_direction_code(&self) -> u32 {
        uint_get(&self.words, FAN_DIRECTION.0, FAN_DIRECTION.1)
    }

    /// Fan direction
    pub fn fan_direction(&self) -> Option<FanDirection> {
        FanDirection::from_code(self.fan_direction_code())
    }

    /// Set fan direction
    pub fn set_fan_direction(&mut self, direction: FanDirection) {
        uint_set(&mut self.words, FAN_DIRECTION.0, FAN_DIRECTION.1, direction.code());
    }

    /// Filter needs cleaning
    pub fn filter_warning(&self) -> bool {
        uint_get(&self.words, FILTER.0, FILTER.1) != 0
    }

    /// Setpoint in °C
    pub fn setpoint(&self) -> f32 {
        temperature_get(&self.words, SETPOINT.0, SETPOINT.1)
    }

    /// Set setpoint in °C
    pub fn set_setpoint(&mut self, celsius: f32) {
        temperature_set(&mut self.words, SETPOINT.0, SETPOINT.1, celsius);
    }

    /// Room temperature in °C
    pub fn room_temperature(&self) -> f32 {
        temperature_get(&self.words, ROOM_TEMPERATURE.0, ROOM_TEMPERATURE.1)
    }
}

/// Writable holding block with local dirty tracking
///
/// `dirty` is raised by any setter that changes the stored bits and cleared
/// only by [`mark_written`](Self::mark_written). Timestamps are milliseconds on
/// the gateway clock; `None` means never.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldingBlock {
    words: [u16; 3],
    dirty: bool,
    last_read: Option<u64>,
    last_write: Option<u64>,
}

impl RegisterBlock for HoldingBlock {
    const KIND: RegisterKind = RegisterKind::Holding;
    const BASE: u16 = 2000;
    const COUNT: u16 = 3;

    fn words(&self) -> &[u16] {
        &self.words
    }

    fn words_mut(&mut self) -> &mut [u16] {
        &mut self.words
    }
}

impl HoldingBlock {
    /// Wrap raw words, clean and never read
    pub fn from_words(words: [u16; 3]) -> Self {
        Self {
            words,
            ..Self::default()
        }
    }

    /// Local image differs from what was last written
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Time of the last successful read
    pub fn last_read(&self) -> Option<u64> {
        self.last_read
    }

    /// Time of the last successful write
    pub fn last_write(&self) -> Option<u64> {
        self.last_write
    }

    /// Power
    pub fn power(&self) -> bool {
        bit_get(&self.words, POWER)
    }

    /// Set power
    pub fn set_power(&mut self, on: bool) {
        self.dirty |= bit_set(&mut self.words, POWER, on);
    }

    /// Operating mode
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_code(uint_get(&self.words, MODE.0, MODE.1))
    }

    /// Set operating mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.set_mode_code(mode.code());
    }

    fn set_mode_code(&mut self, code: u32) {
        self.dirty |= uint_set(&mut self.words, MODE.0, MODE.1, code);
    }

    /// Setpoint in °C
    pub fn setpoint(&self) -> f32 {
        temperature_get(&self.words, SETPOINT.0, SETPOINT.1)
    }

    /// Set setpoint in °C
    pub fn set_setpoint(&mut self, celsius: f32) {
        self.dirty |= temperature_set(&mut self.words, SETPOINT.0, SETPOINT.1, celsius);
    }

    /// Fan speed
    pub fn fan_speed(&self) -> Option<FanSpeed> {
        FanSpeed::from_code(uint_get(&self.words, FAN_SPEED.0, FAN_SPEED.1))
    }

    /// Set fan speed; also enables remote fan control
    pub fn set_fan_speed(&mut self, speed: FanSpeed) {
        self.set_fan_speed_code(speed.code());
    }

    fn set_fan_speed_code(&mut self, code: u32) {
        self.dirty |= uint_set(&mut self.words, FAN_SPEED.0, FAN_SPEED.1, code);
        self.set_fan_control(true);
    }

    /// Fan direction
    pub fn fan_direction(&self) -> Option<FanDirection> {
        FanDirection::from_code(uint_get(&self.words, FAN_DIRECTION.0, FAN_DIRECTION.1))
    }

    /// Set fan direction; also enables remote fan control
    pub fn set_fan_direction(&mut self, direction: FanDirection) {
        self.set_fan_direction_code(direction.code());
    }

    fn set_fan_direction_code(&mut self, code: u32) {
        self.dirty |= uint_set(&mut self.words, FAN_DIRECTION.0, FAN_DIRECTION.1, code);
        self.set_fan_control(true);
    }

    /// Remote fan control enabled
    pub fn fan_control(&self) -> bool {
        uint_get(&self.words, FAN_CONTROL.0, FAN_CONTROL.1) == FAN_CONTROL_ENABLED
    }

    /// Enable or disable remote fan control
    pub fn set_fan_control(&mut self, enabled: bool) {
        let code = if enabled { FAN_CONTROL_ENABLED } else { 0 };
        self.dirty |= uint_set(&mut self.words, FAN_CONTROL.0, FAN_CONTROL.1, code);
    }

    /// Filter reset requested
    pub fn filter_reset(&self) -> bool {
        uint_get(&self.words, FILTER.0, FILTER.1) != 0
    }

    /// Request or clear a filter reset
    pub fn set_filter_reset(&mut self, on: bool) {
        let code = if on { FILTER_RESET_ON } else { 0 };
        self.dirty |= uint_set(&mut self.words, FILTER.0, FILTER.1, code);
    }

    /// Record a successful read
    pub fn mark_read(&mut self, now_ms: u64) {
        self.last_read = Some(now_ms);
    }

    /// Record a successful write and clear the dirty flag
    pub fn mark_written(&mut self, now_ms: u64) {
        self.last_write = Some(now_ms);
        self.dirty = false;
    }

    /// Read less than `secs` seconds ago
    pub fn read_within(&self, now_ms: u64, secs: u32) -> bool {
        within(self.last_read, now_ms, secs)
    }

    /// Written less than `secs` seconds ago
    pub fn write_within(&self, now_ms: u64, secs: u32) -> bool {
        within(self.last_write, now_ms, secs)
    }

    /// Overwrite every controllable field from the status image
    pub fn sync_from_status(&mut self, status: &StatusBlock) {
        self.set_power(status.power());
        self.set_fan_direction_code(status.fan_direction_code());
        self.set_fan_speed_code(status.fan_speed_code());
        self.set_mode_code(status.mode_code());
        self.set_setpoint(status.setpoint());
    }
}

fn within(stamp: Option<u64>, now_ms: u64, secs: u32) -> bool {
    stamp.is_some_and(|t| now_ms.saturating_sub(t) < u64::from(secs) * 1000)
}

#[allow(clippy::cast_possible_truncation)]
impl ErrorBlock {
    /// First error code character
    pub fn code_char0(&self) -> char {
        char::from(uint_get(&self.words, 0, 8) as u8)
    }

    /// Second error code character
    pub fn code_char1(&self) -> char {
        char::from(uint_get(&self.words, 8, 8) as u8)
    }

    /// Two-character error code, e.g. `A1`
    pub fn code(&self) -> String {
        [self.code_char0(), self.code_char1()].iter().collect()
    }

    /// Error sub-code
    pub fn subcode(&self) -> u8 {
        uint_get(&self.words, 16, 6) as u8
    }

    /// Error active
    pub fn error(&self) -> bool {
        bit_get(&self.words, 24)
    }

    /// Alarm active
    pub fn alarm(&self) -> bool {
        bit_get(&self.words, 25)
    }

    /// Warning active
    pub fn warning(&self) -> bool {
        bit_get(&self.words, 26)
    }

    /// Any of error, alarm or warning
    pub fn is_active(&self) -> bool {
        self.error() || self.alarm() || self.warning()
    }

    /// Unit number that raised the error
    pub fn unit_number(&self) -> u8 {
        uint_get(&self.words, 28, 4) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{sint_get, uint_set};

    #[test]
    fn test_addresses() {
        assert_eq!(SystemStatus::address(0), 0);
        assert_eq!(CapabilityBlock::address(5), 1015);
        assert_eq!(StatusBlock::address(63), 2378);
        assert_eq!(HoldingBlock::address(2), 2006);
        assert_eq!(ErrorBlock::address(10), 3620);
        assert_eq!(HoldingBlock::KIND, RegisterKind::Holding);
        assert_eq!(StatusBlock::KIND, RegisterKind::Input);
    }

    #[test]
    fn test_system_status_bitmaps() {
        let mut words = [0u16; 9];
        words[0] = 0b11;
        // slot 5 connected, slot 63 connected and in error
        words[1] = 1 << 5;
        words[4] = 1 << 15;
        words[8] = 1 << 15;
        let status = SystemStatus::from_words(words);
        assert!(status.initialized());
        assert!(status.other_master());
        assert!(status.unit_connected(5));
        assert!(status.unit_connected(63));
        assert!(status.unit_error(63));
        assert!(!status.unit_error(5));
        assert!(!status.unit_connected(64));
        assert_eq!(status.healthy_units().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_capability_decode() {
        let mut cap = CapabilityBlock::default();
        let w = cap.words_mut();
        uint_set(w, 0, 5, 0b10110);
        uint_set(w, 8, 3, 5);
        uint_set(w, 11, 1, 1);
        uint_set(w, 12, 3, 3);
        uint_set(w, 15, 1, 1);
        uint_set(w, 16, 8, 32);
        uint_set(w, 24, 8, 18);
        uint_set(w, 32, 8, 30);
        // -5 in sign-magnitude
        uint_set(w, 40, 8, 0x85);
        let decoded = cap.decode();
        assert!(!decoded.fan && decoded.cool && decoded.heat && !decoded.auto && decoded.dry);
        assert!(decoded.fan_direction && decoded.fan_speed);
        assert_eq!(decoded.fan_direction_steps, 5);
        assert_eq!(decoded.fan_speed_steps, 3);
        assert_eq!(decoded.cool_setpoint, (18, 32));
        assert_eq!(decoded.heat_setpoint, (-5, 30));
    }

    #[test]
    fn test_status_fields() {
        let mut status = StatusBlock::default();
        status.set_power(true);
        status.set_mode(Mode::Heat);
        status.set_fan_speed(FanSpeed::High);
        status.set_fan_direction(FanDirection::Swing);
        status.set_setpoint(21.5);
        uint_set(status.words_mut(), 64, 16, 0x8000 | 35);
        uint_set(status.words_mut(), 24, 4, 2);
        assert!(status.power());
        assert_eq!(status.mode(), Some(Mode::Heat));
        assert_eq!(status.current_mode(), Some(Mode::Cool));
        assert_eq!(status.fan_speed(), Some(FanSpeed::High));
        assert_eq!(status.fan_direction(), Some(FanDirection::Swing));
        assert_eq!(status.setpoint(), 21.5);
        assert_eq!(status.room_temperature(), -3.5);
        assert!(!status.filter_warning());
        uint_set(status.words_mut(), 20, 4, 1);
        assert!(status.filter_warning());
    }

    #[test]
    fn test_unknown_codes_decode_as_none() {
        let mut status = StatusBlock::default();
        uint_set(status.words_mut(), 16, 4, 12);
        uint_set(status.words_mut(), 8, 3, 5);
        assert_eq!(status.mode(), None);
        assert_eq!(status.fan_direction(), None);
    }

    #[test]
    fn test_holding_fan_setters_enable_fan_control() {
        let mut holding = HoldingBlock::default();
        assert!(!holding.fan_control());
        holding.set_fan_speed(FanSpeed::Low);
        assert!(holding.fan_control());
        assert!(holding.is_dirty());

        let mut holding = HoldingBlock::default();
        holding.set_fan_direction(FanDirection::P0);
        // Direction value unchanged but control flag still raised
        assert!(holding.fan_control());
        assert!(holding.is_dirty());
        assert_eq!(uint_get(holding.words(), 4, 4), 6);
    }

    #[test]
    fn test_holding_dirty_only_on_change() {
        let mut holding = HoldingBlock::default();
        holding.set_power(false);
        holding.set_setpoint(0.0);
        assert!(!holding.is_dirty());
        holding.set_setpoint(24.0);
        assert!(holding.is_dirty());
        holding.mark_written(100);
        assert!(!holding.is_dirty());
        holding.set_setpoint(24.0);
        assert!(!holding.is_dirty());
    }

    #[test]
    fn test_holding_filter_reset() {
        let mut holding = HoldingBlock::default();
        holding.set_filter_reset(true);
        assert_eq!(uint_get(holding.words(), 20, 4), 15);
        assert!(holding.filter_reset());
        holding.set_filter_reset(false);
        assert!(!holding.filter_reset());
    }

    #[test]
    fn test_cache_windows() {
        let mut holding = HoldingBlock::default();
        assert!(!holding.read_within(1_000, 35));
        assert!(!holding.write_within(1_000, 35));
        holding.mark_read(10_000);
        holding.mark_written(20_000);
        assert!(holding.read_within(44_999, 35));
        assert!(!holding.read_within(45_000, 35));
        assert!(holding.write_within(30_000, 35));
        assert!(!holding.write_within(56_000, 35));
    }

    #[test]
    fn test_sync_from_status() {
        let mut status = StatusBlock::default();
        status.set_power(true);
        status.set_mode(Mode::Cool);
        status.set_fan_speed(FanSpeed::Medium);
        status.set_fan_direction(FanDirection::P2);
        status.set_setpoint(-1.5);

        let mut holding = HoldingBlock::default();
        holding.sync_from_status(&status);
        assert!(holding.is_dirty());
        assert!(holding.power());
        assert_eq!(holding.mode(), Some(Mode::Cool));
        assert_eq!(holding.fan_speed(), Some(FanSpeed::Medium));
        assert_eq!(holding.fan_direction(), Some(FanDirection::P2));
        assert!(holding.fan_control());
        assert_eq!(sint_get(holding.words(), 32, 16), -15);

        holding.mark_written(1);
        holding.sync_from_status(&status);
        assert!(!holding.is_dirty());
    }

    #[test]
    fn test_error_block() {
        let mut block = ErrorBlock::default();
        let w = block.words_mut();
        uint_set(w, 0, 8, u32::from(b'A'));
        uint_set(w, 8, 8, u32::from(b'3'));
        uint_set(w, 16, 6, 17);
        uint_set(w, 24, 1, 1);
        uint_set(w, 26, 1, 1);
        uint_set(w, 28, 4, 9);
        assert_eq!(block.code(), "A3");
        assert_eq!(block.subcode(), 17);
        assert!(block.error() && !block.alarm() && block.warning());
        assert!(block.is_active());
        assert_eq!(block.unit_number(), 9);
    }
}
