//! Enumerated field values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Register table a block lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read-only input registers
    Input,
    /// Read/write holding registers
    Holding,
}

impl RegisterKind {
    /// Modbus function code used to read this table
    pub fn read_function(self) -> u8 {
        match self {
            Self::Holding => 0x03,
            Self::Input => 0x04,
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Holding => write!(f, "holding"),
        }
    }
}

/// Unknown enumeration name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown value '{value}', expected one of: {expected}")]
pub struct ParseEnumError {
    /// Text that failed to parse
    pub value: String,
    /// Accepted names
    pub expected: String,
}

fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! field_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:expr => $label:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),+
        }

        impl $name {
            /// All values in code order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Decode from the raw field value
            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $(c if c == $code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Raw field value
            pub fn code(self) -> u32 {
                self as u32
            }

            /// Display name
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = normalize(s);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| normalize(v.name()) == wanted)
                    .ok_or_else(|| ParseEnumError {
                        value: s.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.name())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }
    };
}

field_enum! {
    /// Operating mode
    Mode {
        /// Fan only
        Fan = 0 => "fan",
        /// Heating
        Heat = 1 => "heat",
        /// Cooling
        Cool = 2 => "cool",
        /// Automatic heat/cool
        Auto = 3 => "auto",
        /// Ventilation
        Vent = 4 => "vent",
        /// Undefined
        Undefined = 5 => "undefined",
        /// Follows another unit
        Slave = 6 => "slave",
        /// Dehumidify
        Dry = 7 => "dry",
    }
}

field_enum! {
    /// Fan speed step
    FanSpeed {
        /// Automatic
        Auto = 0 => "auto",
        /// Low
        Low = 1 => "low",
        /// Low-medium
        LowMedium = 2 => "low_medium",
        /// Medium
        Medium = 3 => "medium",
        /// High-medium
        HighMedium = 4 => "high_medium",
        /// High
        High = 5 => "high",
    }
}

field_enum! {
    /// Louvre position
    FanDirection {
        /// Position 0
        P0 = 0 => "p0",
        /// Position 1
        P1 = 1 => "p1",
        /// Position 2
        P2 = 2 => "p2",
        /// Position 3
        P3 = 3 => "p3",
        /// Position 4
        P4 = 4 => "p4",
        /// Stopped
        Stop = 6 => "stop",
        /// Swinging
        Swing = 7 => "swing",
    }
}
