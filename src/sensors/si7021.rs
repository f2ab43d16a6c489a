//! Si7021 temperature sensor on the two-wire bus.
//!
//! Uses the "measure temperature, no hold master" command: the sensor
//! NACKs its read address until the conversion finishes, which the
//! transaction machine absorbs in its WaitAck3 state.  The 16-bit
//! big-endian result converts as
//!
//! ```text
//!   °C = raw × 175.72 / 65536 − 46.85
//!   °F = °C × 9/5 + 32
//! ```
//!
//! No CRC byte is requested.

use crate::app::ports::TwoWireBus;
use crate::context::Context;
use crate::drivers::i2c::{I2c, Transfer};
use crate::error::Result;

pub const SI7021_ADDRESS: u8 = 0x40;
pub const MEASURE_TEMP_NO_HOLD: u8 = 0xF3;

/// Result bytes per temperature measurement.
const READ_LEN: u8 = 2;

pub fn raw_to_celsius(raw: u32) -> f32 {
    raw as f32 * 175.72 / 65536.0 - 46.85
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub raw: u16,
    pub celsius: f32,
    pub fahrenheit: f32,
}

impl TemperatureReading {
    pub fn from_raw(raw: u32) -> Self {
        let celsius = raw_to_celsius(raw);
        Self {
            raw: raw as u16,
            celsius,
            fahrenheit: celsius_to_fahrenheit(celsius),
        }
    }
}

pub struct Si7021 {
    address: u8,
    command: u8,
    last: Option<TemperatureReading>,
}

impl Si7021 {
    pub fn new(address: u8, command: u8) -> Self {
        Self {
            address,
            command,
            last: None,
        }
    }

    /// Kick off a measurement; completion arrives as the driver's done event.
    pub fn start_read<B: TwoWireBus>(&self, i2c: &mut I2c<B>, ctx: &Context) -> Result<()> {
        i2c.start(Transfer::read(self.address, self.command, READ_LEN), ctx)
    }

    /// Collect the finished measurement from the driver.
    pub fn complete<B: TwoWireBus>(&mut self, i2c: &mut I2c<B>) -> Result<TemperatureReading> {
        let reading = TemperatureReading::from_raw(i2c.take_result()?);
        self.last = Some(reading);
        Ok(reading)
    }

    pub fn last(&self) -> Option<TemperatureReading> {
        self.last
    }
}

impl Default for Si7021 {
    fn default() -> Self {
        Self::new(SI7021_ADDRESS, MEASURE_TEMP_NO_HOLD)
    }
}
