//! System configuration parameters
//!
//! All tunable parameters for the beacon.  The host build can load them
//! from a JSON file; missing fields fall back to the defaults below.

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::app::commands::TempUnit;
use crate::ble::RING_CAPACITY;
use crate::ble::hm10::MAX_NAME_LEN;
use crate::drivers::hw_timer::PwmConfig;
use crate::drivers::i2c::{DEFAULT_RETRY_LIMIT, I2cConfig};
use crate::drivers::leuart::LeuartConfig;
use crate::error::{Error, Result};
use crate::sensors::si7021::{MEASURE_TEMP_NO_HOLD, SI7021_ADDRESS};

pub const MAX_BOOT_MESSAGES: usize = 4;
pub const BOOT_MESSAGE_LEN: usize = 32;

pub type BootMessage = String<BOOT_MESSAGE_LEN>;

/// Greeting burst queued into the ring at boot.
pub const DEFAULT_BOOT_MESSAGES: [&str; 3] = ["\nHello World\n", "Circular Buffer Lab\n", "ThermoBeacon\n"];

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Timer ---
    /// Seconds between temperature samples
    pub pwm_period_secs: f32,
    /// Seconds the timer output stays active each period
    pub pwm_active_secs: f32,
    /// Timer clock after prescaling (Hz)
    pub timer_clock_hz: u32,

    // --- Sensor ---
    /// Si7021 7-bit bus address
    pub sensor_address: u8,
    /// Measurement command byte
    pub sensor_command: u8,
    /// Read-address NACKs tolerated per measurement (`None` = forever)
    pub sensor_retry_limit: Option<u32>,

    // --- Application ---
    /// LED lights at or above this temperature (°F)
    pub led_threshold_f: f32,
    /// Unit used until a command arrives
    pub default_unit: TempUnit,

    // --- Serial link ---
    pub start_frame: u8,
    pub signal_frame: u8,
    /// Rename the radio during the AT self-test
    pub radio_name: Option<String<16>>,

    // --- Boot ---
    pub self_test: bool,
    /// Bound on every polled wait during self-tests
    pub self_test_spin_limit: u32,
    /// Lines written to the radio once boot completes
    pub boot_messages: Vec<BootMessage, MAX_BOOT_MESSAGES>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut boot_messages = Vec::new();
        for line in DEFAULT_BOOT_MESSAGES {
            // every default line is shorter than BOOT_MESSAGE_LEN
            let _ = boot_messages.push(BootMessage::try_from(line).unwrap_or_default());
        }

        Self {
            // Timer
            pwm_period_secs: 3.1,
            pwm_active_secs: 0.10,
            timer_clock_hz: 1000,

            // Sensor
            sensor_address: SI7021_ADDRESS,
            sensor_command: MEASURE_TEMP_NO_HOLD,
            sensor_retry_limit: Some(DEFAULT_RETRY_LIMIT),

            // Application
            led_threshold_f: 80.0,
            default_unit: TempUnit::Celsius,

            // Serial link
            start_frame: b'#',
            signal_frame: b'!',
            radio_name: None,

            // Boot
            self_test: true,
            self_test_spin_limit: 10_000,
            boot_messages,
        }
    }
}

impl SystemConfig {
    /// Reject combinations the drivers cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.pwm_config().counts()?;
        if self.sensor_address > 0x7F {
            return Err(Error::Config("sensor address must be 7-bit"));
        }
        if self.sensor_retry_limit == Some(0) {
            return Err(Error::Config("sensor retry limit must be at least 1"));
        }
        if self.start_frame == self.signal_frame {
            return Err(Error::Config("start and signal frames must differ"));
        }
        if self.self_test_spin_limit == 0 {
            return Err(Error::Config("self-test spin limit must be non-zero"));
        }
        if let Some(name) = &self.radio_name {
            if name.is_empty() || name.len() > MAX_NAME_LEN {
                return Err(Error::Config("radio name must be 1-12 characters"));
            }
        }
        let queued: usize = self.boot_messages.iter().map(|m| m.len() + 1).sum();
        if queued >= RING_CAPACITY {
            return Err(Error::Config("boot messages do not fit the radio ring"));
        }
        if !self.led_threshold_f.is_finite() {
            return Err(Error::Config("LED threshold must be finite"));
        }
        Ok(())
    }

    pub fn pwm_config(&self) -> PwmConfig {
        PwmConfig {
            period_secs: self.pwm_period_secs,
            active_secs: self.pwm_active_secs,
            clock_hz: self.timer_clock_hz,
            ..PwmConfig::default()
        }
    }

    pub fn i2c_config(&self) -> I2cConfig {
        I2cConfig {
            retry_limit: self.sensor_retry_limit,
            ..I2cConfig::default()
        }
    }

    pub fn leuart_config(&self) -> LeuartConfig {
        LeuartConfig {
            start_frame: self.start_frame,
            signal_frame: self.signal_frame,
            ..LeuartConfig::default()
        }
    }
}
