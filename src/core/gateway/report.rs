//! Serializable unit snapshots

use super::unit::Unit;
use crate::core::codec::{Capability, FanDirection, FanSpeed, Mode};
use serde::Serialize;

/// Decoded view of a unit's status mirror
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    /// Slot index
    pub index: u8,
    /// Display id
    pub id: String,
    /// Found by discovery
    pub present: bool,
    /// Unit is on
    pub power: bool,
    /// Selected mode, `None` for codes outside the known set
    pub mode: Option<Mode>,
    /// Raw mode code
    pub mode_code: u32,
    /// Mode the unit is actually running
    pub current_mode: Option<Mode>,
    /// Target temperature in °C
    pub setpoint: f32,
    /// Room temperature in °C
    pub room_temperature: f32,
    /// Fan speed step
    pub fan_speed: Option<FanSpeed>,
    /// Louvre position
    pub fan_direction: Option<FanDirection>,
    /// Filter sign is lit
    pub filter_warning: bool,
    /// Heating active
    pub heat: bool,
    /// Thermostat demand
    pub thermo: bool,
    /// Defrost cycle running
    pub defrost: bool,
    /// Local holding edits not yet written
    pub holding_dirty: bool,
    /// Supported features
    pub capability: Capability,
}

impl From<&Unit> for UnitReport {
    fn from(unit: &Unit) -> Self {
        let status = unit.status();
        Self {
            index: unit.index(),
            id: unit.id().to_string(),
            present: unit.is_present(),
            power: status.power(),
            mode: status.mode(),
            mode_code: status.mode_code(),
            current_mode: status.current_mode(),
            setpoint: status.setpoint(),
            room_temperature: status.room_temperature(),
            fan_speed: status.fan_speed(),
            fan_direction: status.fan_direction(),
            filter_warning: status.filter_warning(),
            heat: status.heat(),
            thermo: status.thermo(),
            defrost: status.defrost(),
            holding_dirty: unit.holding().is_dirty(),
            capability: unit.capability().decode(),
        }
    }
}

/// Decoded view of a unit's cached error block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Slot index
    pub index: u8,
    /// Display id
    pub id: String,
    /// Error active
    pub error: bool,
    /// Alarm active
    pub alarm: bool,
    /// Warning active
    pub warning: bool,
    /// Two-character code; empty when no code is set
    pub code: String,
    /// Sub-code
    pub sub_code: u8,
    /// Unit number inside the group that raised it
    pub unit_number: u8,
}

impl ErrorReport {
    /// Any of error, alarm or warning
    pub fn is_active(&self) -> bool {
        self.error || self.alarm || self.warning
    }
}

impl From<&Unit> for ErrorReport {
    fn from(unit: &Unit) -> Self {
        let block = unit.error();
        Self {
            index: unit.index(),
            id: unit.id().to_string(),
            error: block.error(),
            alarm: block.alarm(),
            warning: block.warning(),
            code: block.code().trim_matches(|c: char| c == '\0' || c == ' ').to_string(),
            sub_code: block.subcode(),
            unit_number: block.unit_number(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{ErrorBlock, StatusBlock};

    #[test]
    fn test_unit_report_fields() {
        let mut unit = Unit::new(5);
        unit.present = true;
        let mut status = StatusBlock::default();
        status.set_power(true);
        status.set_mode(Mode::Heat);
        status.set_setpoint(21.5);
        unit.status = status;

        let report = UnitReport::from(&unit);
        assert_eq!(report.id, "1-05");
        assert!(report.power);
        assert_eq!(report.mode, Some(Mode::Heat));
        assert_eq!(report.mode_code, 1);
        assert!((report.setpoint - 21.5).abs() < f32::EPSILON);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "heat");
        assert_eq!(json["fan_speed"], "auto");
    }

    #[test]
    fn test_error_report() {
        let mut unit = Unit::new(0);
        // "A3", sub-code 2, error bit
        unit.error = ErrorBlock::from_words([u16::from_le_bytes([b'A', b'3']), 0x0102]);

        let report = ErrorReport::from(&unit);
        assert_eq!(report.code, "A3");
        assert_eq!(report.sub_code, 2);
        assert!(report.error);
        assert!(!report.alarm);
        assert!(report.is_active());

        let clear = ErrorReport::from(&Unit::new(1));
        assert_eq!(clear.code, "");
        assert!(!clear.is_active());
    }
}
