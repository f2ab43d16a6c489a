//! Test rig around [`AppService`] and the simulated peripherals.
//!
//! Plays the part of the interrupt controller: every `step` runs the
//! peripheral handlers and then one main-loop pass.

use thermo_beacon::adapters::sim::{SimPin, SimSerial, SimSi7021Bus, SimSleep, SimTimer};
use thermo_beacon::app::service::{AppService, Peripherals};
use thermo_beacon::config::SystemConfig;
use thermo_beacon::context::Context;
use thermo_beacon::error::Result;
use thermo_beacon::power::EnergyMode;

pub type SimApp = AppService<SimSi7021Bus, SimSerial, SimTimer, SimPin>;

/// Steps allowed before a rig is considered wedged.
const SETTLE_LIMIT: usize = 10_000;

pub struct Rig {
    pub app: SimApp,
    pub ctx: Context,
    pub sleep: SimSleep,
}

#[allow(dead_code)]
impl Rig {
    /// Opened but not yet booted.
    pub fn open(config: SystemConfig, bus: SimSi7021Bus, serial: SimSerial) -> Self {
        let hw = Peripherals {
            bus,
            serial,
            timer: SimTimer::new(),
            led: SimPin::new(),
        };
        let ctx = Context::new();
        let mut app = AppService::new(config, hw).unwrap();
        app.open(&ctx).unwrap();
        Self {
            app,
            ctx,
            sleep: SimSleep::new(),
        }
    }

    /// Opened, booted and idle with the timer running.
    pub fn booted(config: SystemConfig) -> Self {
        let mut rig = Self::open(config, SimSi7021Bus::new(), SimSerial::new());
        rig.settle().unwrap();
        rig.take_radio();
        rig
    }

    pub fn step(&mut self) -> Result<Option<EnergyMode>> {
        self.app.service_interrupts(&self.ctx)?;
        self.app.run_once(&self.ctx, &mut self.sleep)
    }

    pub fn is_quiet(&self) -> bool {
        self.ctx.events.is_empty()
            && !self.app.i2c().bus().has_pending()
            && !self.app.ble().leuart().port().has_pending()
            && !self.app.timer().port().has_pending()
    }

    /// Step until nothing is left to do.
    pub fn settle(&mut self) -> Result<()> {
        for _ in 0..SETTLE_LIMIT {
            self.step()?;
            if self.is_quiet() {
                return Ok(());
            }
        }
        panic!("rig did not settle within {SETTLE_LIMIT} steps");
    }

    /// One timer period: sample, report, and go quiet again.
    pub fn sample(&mut self) -> Result<()> {
        assert!(self.app.timer_mut().port_mut().elapse_period(), "timer is stopped");
        self.settle()
    }

    /// Bytes sent by the phone.
    pub fn phone_sends(&mut self, bytes: &[u8]) -> Result<()> {
        self.app.ble_mut().leuart_mut().port_mut().inject(bytes);
        self.settle()
    }

    /// Everything the radio transmitted since the last call.
    pub fn take_radio(&mut self) -> String {
        let bytes = self.app.ble_mut().leuart_mut().port_mut().take_radio_received();
        String::from_utf8(bytes).unwrap()
    }

    pub fn bus_mut(&mut self) -> &mut SimSi7021Bus {
        self.app.i2c_mut().bus_mut()
    }
}
