//! Unit commands

use crate::core::codec::{FanDirection, FanSpeed, Mode};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Rejected command request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Name is not a known command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Command needs a numeric value
    #[error("command '{0}' requires a value")]
    MissingValue(&'static str),

    /// Value outside what the command accepts
    #[error("invalid value {value} for command '{command}'")]
    InvalidValue {
        /// Command name
        command: &'static str,
        /// Offending value
        value: f64,
    },
}

/// A single change applied to a unit through prepare/commit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "cmd", content = "value", rename_all = "snake_case")]
pub enum Command {
    /// Switch on or off
    Power(bool),
    /// Select an operating mode; also switches the unit on
    Mode(Mode),
    /// Target temperature in °C
    Setpoint(f32),
    /// Fan speed step
    FanSpeed(FanSpeed),
    /// Louvre position
    #[serde(rename = "fan_dir")]
    FanDirection(FanDirection),
    /// Pulse the filter-sign reset
    FilterReset,
}

impl Command {
    /// Build a command from its wire name and optional numeric value
    ///
    /// Names: `power` (on when value > 0.5), `mode`, `setpoint`, `fan_speed`,
    /// `fan_dir`, `filter_reset`. Enumerated values are numeric codes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_request(name: &str, value: Option<f64>) -> Result<Self, CommandError> {
        let command = match name {
            "power" => "power",
            "mode" => "mode",
            "setpoint" => "setpoint",
            "fan_speed" => "fan_speed",
            "fan_dir" | "fan_direction" => "fan_dir",
            "filter_reset" => return Ok(Self::FilterReset),
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };

        let value = value.ok_or(CommandError::MissingValue(command))?;
        let invalid = CommandError::InvalidValue { command, value };
        if !value.is_finite() {
            return Err(invalid);
        }

        let code = || {
            if value < 0.0 || value > f64::from(u32::MAX) {
                None
            } else {
                Some(value as u32)
            }
        };

        match command {
            "power" => Ok(Self::Power(value > 0.5)),
            "setpoint" => Ok(Self::Setpoint(value as f32)),
            "mode" => code().and_then(Mode::from_code).map(Self::Mode).ok_or(invalid),
            "fan_speed" => code()
                .and_then(FanSpeed::from_code)
                .map(Self::FanSpeed)
                .ok_or(invalid),
            _ => code()
                .and_then(FanDirection::from_code)
                .map(Self::FanDirection)
                .ok_or(invalid),
        }
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Power(_) => "power",
            Self::Mode(_) => "mode",
            Self::Setpoint(_) => "setpoint",
            Self::FanSpeed(_) => "fan_speed",
            Self::FanDirection(_) => "fan_dir",
            Self::FilterReset => "filter_reset",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power(on) => write!(f, "power={}", if *on { "on" } else { "off" }),
            Self::Mode(mode) => write!(f, "mode={mode}"),
            Self::Setpoint(celsius) => write!(f, "setpoint={celsius:.1}"),
            Self::FanSpeed(speed) => write!(f, "fan_speed={speed}"),
            Self::FanDirection(direction) => write!(f, "fan_dir={direction}"),
            Self::FilterReset => write!(f, "filter_reset"),
        }
    }
}
