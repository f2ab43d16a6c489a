//! Threshold indicator LED.
//!
//! Lit while the last temperature reading is at or above the configured
//! Fahrenheit threshold.  Drives any `embedded_hal` output pin.

use embedded_hal::digital::OutputPin;

use crate::error::{Error, Result};

pub struct ThresholdLed<P> {
    pin: P,
    threshold_f: f32,
    lit: bool,
}

impl<P: OutputPin> ThresholdLed<P> {
    pub fn new(pin: P, threshold_f: f32) -> Self {
        Self {
            pin,
            threshold_f,
            lit: false,
        }
    }

    /// Update the LED for a new reading; returns whether it is lit.
    pub fn update(&mut self, fahrenheit: f32) -> Result<bool> {
        let lit = fahrenheit >= self.threshold_f;
        if lit {
            self.pin.set_high().map_err(|_| Error::Gpio)?;
        } else {
            self.pin.set_low().map_err(|_| Error::Gpio)?;
        }
        self.lit = lit;
        Ok(lit)
    }

    pub fn off(&mut self) -> Result<()> {
        self.pin.set_low().map_err(|_| Error::Gpio)?;
        self.lit = false;
        Ok(())
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn lights_at_threshold_and_above() {
        let expectations = [
            Transaction::set(State::Low),
            Transaction::set(State::High),
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ];
        let mut led = ThresholdLed::new(PinMock::new(&expectations), 80.0);

        assert!(!led.update(79.9).unwrap());
        assert!(led.update(80.0).unwrap());
        assert!(led.update(95.5).unwrap());
        assert!(led.is_lit());
        led.off().unwrap();
        assert!(!led.is_lit());

        led.pin_mut().done();
    }
}
