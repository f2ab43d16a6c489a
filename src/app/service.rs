//! Application service: the event-driven core.
//!
//! [`AppService`] owns every driver and reacts to scheduled events.
//! Interrupt handlers only post events; the main loop calls
//! [`run_once`](AppService::run_once), which dispatches them in a fixed
//! order and sleeps as deep as the energy-mode table allows when there
//! is nothing to do.
//!
//! ```text
//!  LETIMER UF ──▶ start Si7021 read ──▶ SensorReadDone
//!                                            │ convert, LED, format
//!                                            ▼
//!  TX done ◀── LEUART ◀── FrameRing ◀── Ble::write("\nTempC = ..")
//!     │
//!     └──▶ start timer, pump next frame
//!
//!  RX done ──▶ "#TEMPF!" / "#TEMPC!" ──▶ unit
//! ```

use core::fmt::Write;

use embedded_hal::digital::OutputPin;
use heapless::String;
use log::{debug, info, warn};
use serde::Serialize;

use crate::ble::Ble;
use crate::config::SystemConfig;
use crate::context::Context;
use crate::diagnostics::{self, SelfTestReport};
use crate::drivers::hw_timer::PwmTimer;
use crate::drivers::i2c::I2c;
use crate::drivers::status_led::ThresholdLed;
use crate::error::{Error, PreconditionError, ResourceError, Result};
use crate::events::Event;
use crate::power::EnergyMode;
use crate::sensors::si7021::{Si7021, TemperatureReading};

use super::commands::{AppCommand, TempUnit};
use super::ports::{SerialLine, SleepControl, TimerPort, TwoWireBus};

/// Capacity of one formatted report line.
pub const LINE_CAPACITY: usize = 32;

/// The hardware the service drives.
pub struct Peripherals<B, S, T, P> {
    pub bus: B,
    pub serial: S,
    pub timer: T,
    pub led: P,
}

/// Counters for everything the service absorbed instead of halting on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppStats {
    pub readings: u32,
    pub dropped_lines: u32,
    pub skipped_samples: u32,
    pub sensor_faults: u32,
    pub ignored_frames: u32,
    pub recovered_errors: u32,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<B, S, T, P> {
    config: SystemConfig,
    i2c: I2c<B>,
    ble: Ble<S>,
    timer: PwmTimer<T>,
    led: ThresholdLed<P>,
    sensor: Si7021,
    unit: TempUnit,
    stats: AppStats,
    self_test: Option<SelfTestReport>,
}

impl<B, S, T, P> AppService<B, S, T, P>
where
    B: TwoWireBus,
    S: SerialLine,
    T: TimerPort,
    P: OutputPin,
{
    /// Construct the service.  Nothing touches hardware until [`open`](Self::open).
    pub fn new(config: SystemConfig, hw: Peripherals<B, S, T, P>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            i2c: I2c::new(hw.bus, config.i2c_config()),
            ble: Ble::new(hw.serial, config.leuart_config()),
            timer: PwmTimer::new(hw.timer, config.pwm_config()),
            led: ThresholdLed::new(hw.led, config.led_threshold_f),
            sensor: Si7021::new(config.sensor_address, config.sensor_command),
            unit: config.default_unit,
            stats: AppStats::default(),
            self_test: None,
            config,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up every peripheral and schedule the boot event.
    pub fn open(&mut self, ctx: &Context) -> Result<()> {
        ctx.open();
        self.i2c.open();
        self.ble.open(ctx)?;
        self.timer.open()?;
        self.led.off()?;
        ctx.events.post(Event::BootUp);
        info!("app: open, reporting in {}", self.unit);
        Ok(())
    }

    /// Interrupt handlers for every peripheral.
    pub fn service_interrupts(&mut self, ctx: &Context) -> Result<()> {
        self.i2c.service(ctx)?;
        self.ble.service(ctx)?;
        self.timer.service(ctx);
        Ok(())
    }

    /// One main-loop pass: boot, sleep if idle, then handle events.
    ///
    /// Returns the sleep depth entered, if any.  Only fatal errors are
    /// returned; everything else is logged and counted.
    pub fn run_once(&mut self, ctx: &Context, sleep: &mut impl SleepControl) -> Result<Option<EnergyMode>> {
        if ctx.events.is_pending(Event::BootUp) {
            ctx.events.clear(Event::BootUp);
            self.on_boot(ctx)?;
        }

        let slept = if ctx.events.is_empty() {
            ctx.power.enter_best_sleep(sleep)
        } else {
            None
        };

        self.dispatch(ctx)?;
        Ok(slept)
    }

    /// Handle every pending event except boot, in priority order.
    pub fn dispatch(&mut self, ctx: &Context) -> Result<()> {
        if take(ctx, Event::TimerComp0) {
            debug!("app: COMP0");
        }
        if take(ctx, Event::TimerComp1) {
            debug!("app: COMP1");
        }
        if take(ctx, Event::TimerUnderflow) {
            let result = self.on_underflow(ctx);
            self.settle("sample start", result)?;
        }
        if take(ctx, Event::SensorReadDone) {
            let result = self.on_sensor_done(ctx);
            self.settle("sensor read", result)?;
        }
        if take(ctx, Event::SensorFault) {
            self.on_sensor_fault();
        }
        if take(ctx, Event::SerialTxDone) {
            let result = self.on_tx_done(ctx);
            self.settle("tx done", result)?;
        }
        if take(ctx, Event::SerialRxDone) {
            self.on_rx_done();
        }
        Ok(())
    }

    // ── Handlers ──────────────────────────────────────────────

    fn on_boot(&mut self, ctx: &Context) -> Result<()> {
        let report = diagnostics::run_boot_self_tests(&mut self.ble, &self.config, ctx)?;
        self.self_test = Some(report);
        self.ble.ring_mut().init();

        if self.config.boot_messages.is_empty() {
            self.timer.start(true, ctx)?;
        } else {
            for message in &self.config.boot_messages {
                self.ble.write(message.as_bytes(), ctx)?;
            }
        }
        info!("app: boot complete ({:?})", report);
        Ok(())
    }

    fn on_underflow(&mut self, ctx: &Context) -> Result<()> {
        match self.sensor.start_read(&mut self.i2c, ctx) {
            Err(Error::Precondition(PreconditionError::BusBusy)) => {
                self.stats.skipped_samples += 1;
                warn!("app: sensor still busy, sample skipped");
                Ok(())
            }
            other => other,
        }
    }

    fn on_sensor_done(&mut self, ctx: &Context) -> Result<()> {
        let reading = self.sensor.complete(&mut self.i2c)?;
        self.stats.readings += 1;
        self.led.update(reading.fahrenheit)?;

        let line = format_line(&reading, self.unit)?;
        match self.ble.write(line.as_bytes(), ctx) {
            Err(Error::Resource(ResourceError::RingFull { needed, available })) => {
                self.stats.dropped_lines += 1;
                warn!("app: ring full ({} needed, {} free), line dropped", needed, available);
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn on_sensor_fault(&mut self) {
        self.stats.sensor_faults += 1;
        if let Err(e) = self.i2c.take_result() {
            warn!("app: sensor read failed: {}", e);
        }
    }

    fn on_tx_done(&mut self, ctx: &Context) -> Result<()> {
        self.timer.start(true, ctx)?;
        self.ble.pump(ctx)?;
        Ok(())
    }

    fn on_rx_done(&mut self) {
        let Some(frame) = self.ble.take_frame() else {
            return;
        };
        match AppCommand::decode(&frame) {
            Some(command) => self.handle_command(command),
            None => {
                self.stats.ignored_frames += 1;
                debug!("app: ignoring frame {:?}", frame.as_slice());
            }
        }
    }

    /// Apply a command from the radio link.
    pub fn handle_command(&mut self, command: AppCommand) {
        match command {
            AppCommand::SetUnit(unit) => {
                if unit != self.unit {
                    info!("app: reporting in {}", unit);
                }
                self.unit = unit;
            }
        }
    }

    /// Fatal errors pass through; the rest are logged and counted.
    fn settle(&mut self, what: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if !e.is_fatal() => {
                self.stats.recovered_errors += 1;
                warn!("app: {} failed: {}", what, e);
                Ok(())
            }
            other => other,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn unit(&self) -> TempUnit {
        self.unit
    }

    pub fn last_reading(&self) -> Option<TemperatureReading> {
        self.sensor.last()
    }

    pub fn stats(&self) -> AppStats {
        self.stats
    }

    pub fn self_test_report(&self) -> Option<SelfTestReport> {
        self.self_test
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn led(&self) -> &ThresholdLed<P> {
        &self.led
    }

    pub fn i2c(&self) -> &I2c<B> {
        &self.i2c
    }

    pub fn i2c_mut(&mut self) -> &mut I2c<B> {
        &mut self.i2c
    }

    pub fn ble(&self) -> &Ble<S> {
        &self.ble
    }

    pub fn ble_mut(&mut self) -> &mut Ble<S> {
        &mut self.ble
    }

    pub fn timer(&self) -> &PwmTimer<T> {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut PwmTimer<T> {
        &mut self.timer
    }
}

fn take(ctx: &Context, event: Event) -> bool {
    let pending = ctx.events.is_pending(event);
    if pending {
        ctx.events.clear(event);
    }
    pending
}

/// `"\nTempF = 72.4"` style report line.
pub fn format_line(reading: &TemperatureReading, unit: TempUnit) -> Result<String<LINE_CAPACITY>> {
    let value = match unit {
        TempUnit::Celsius => reading.celsius,
        TempUnit::Fahrenheit => reading.fahrenheit,
    };
    let mut line = String::new();
    write!(line, "\nTemp{} = {:4.1}", unit.letter(), value).map_err(|_| ResourceError::PayloadTooLong {
        len: LINE_CAPACITY + 1,
        max: LINE_CAPACITY,
    })?;
    Ok(line)
}
