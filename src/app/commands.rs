//! Inbound commands from the radio link.
//!
//! A connected phone sends fixed seven-byte frames; the receive machine
//! delivers them start byte to signal byte inclusive.
//!
//! | Frame     | Effect                           |
//! |-----------|----------------------------------|
//! | `#TEMPF!` | Report temperatures in °F        |
//! | `#TEMPC!` | Report temperatures in °C        |

use core::fmt;

use serde::{Deserialize, Serialize};

pub const CMD_TEMP_FAHRENHEIT: &[u8] = b"#TEMPF!";
pub const CMD_TEMP_CELSIUS: &[u8] = b"#TEMPC!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    /// Letter used in the report line (`TempC` / `TempF`).
    pub const fn letter(self) -> char {
        match self {
            Self::Celsius => 'C',
            Self::Fahrenheit => 'F',
        }
    }
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "°{}", self.letter())
    }
}

/// Commands the application accepts over the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Switch the reporting unit.
    SetUnit(TempUnit),
}

impl AppCommand {
    /// Match a received frame exactly; anything else is `None`.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        match frame {
            CMD_TEMP_FAHRENHEIT => Some(Self::SetUnit(TempUnit::Fahrenheit)),
            CMD_TEMP_CELSIUS => Some(Self::SetUnit(TempUnit::Celsius)),
            _ => None,
        }
    }
}
