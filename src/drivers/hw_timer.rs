//! Low-energy PWM timer driving the sample cadence.
//!
//! The timer counts down from COMP0 (the period) and raises UF on
//! underflow; COMP1 marks the end of the active window.  Each interrupt
//! is mapped to one scheduled event.  Only the sources enabled in
//! [`PwmConfig`] are posted; the default enables UF alone, which starts
//! each sensor read.
//!
//! While running the timer holds an [`LETIMER_EM`] block: its ULFRCO
//! clock source is gone in EM4.

use log::{debug, info};

use crate::app::ports::{TimerIrq, TimerPort};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::power::EnergyMode;

pub const LETIMER_EM: EnergyMode = EnergyMode::Em4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmConfig {
    pub period_secs: f32,
    pub active_secs: f32,
    pub clock_hz: u32,
    pub comp0_irq: bool,
    pub comp1_irq: bool,
    pub underflow_irq: bool,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            period_secs: 3.1,
            active_secs: 0.10,
            clock_hz: 1000,
            comp0_irq: false,
            comp1_irq: false,
            underflow_irq: true,
        }
    }
}

impl PwmConfig {
    /// Period and active counts in timer ticks.
    pub fn counts(&self) -> Result<(u32, u32)> {
        if self.period_secs <= 0.0 || self.active_secs <= 0.0 {
            return Err(Error::Config("timer periods must be positive"));
        }
        if self.active_secs >= self.period_secs {
            return Err(Error::Config("active period must be shorter than the PWM period"));
        }
        let hz = self.clock_hz as f32;
        let top = (self.period_secs * hz).round() as u32;
        let active = (self.active_secs * hz).round() as u32;
        if top == 0 || top > u32::from(u16::MAX) {
            return Err(Error::Config("PWM period does not fit the 16-bit counter"));
        }
        Ok((top, active))
    }
}

pub struct PwmTimer<T> {
    timer: T,
    config: PwmConfig,
    running: bool,
}

impl<T: TimerPort> PwmTimer<T> {
    pub fn new(timer: T, config: PwmConfig) -> Self {
        Self {
            timer,
            config,
            running: false,
        }
    }

    /// Load the period registers.  The timer is left stopped.
    pub fn open(&mut self) -> Result<()> {
        let (top, active) = self.config.counts()?;
        self.timer.set_running(false);
        self.timer.configure(top, active);
        let _ = self.timer.take_pending();
        info!(
            "hw_timer: period {} ticks, active {} ticks @ {} Hz",
            top, active, self.config.clock_hz
        );
        Ok(())
    }

    /// Start or stop the timer.  Energy blocking is edge-triggered, so
    /// repeated starts are harmless.
    pub fn start(&mut self, enable: bool, ctx: &Context) -> Result<()> {
        match (self.running, enable) {
            (false, true) => {
                ctx.power.block(LETIMER_EM)?;
                self.timer.set_running(true);
                debug!("hw_timer: started");
            }
            (true, false) => {
                self.timer.set_running(false);
                ctx.power.unblock(LETIMER_EM)?;
                debug!("hw_timer: stopped");
            }
            _ => {}
        }
        self.running = enable;
        Ok(())
    }

    /// Interrupt entry point.
    pub fn service(&mut self, ctx: &Context) {
        let pending = self.timer.take_pending();
        if pending.contains(TimerIrq::COMP0) && self.config.comp0_irq {
            ctx.events.post(Event::TimerComp0);
        }
        if pending.contains(TimerIrq::COMP1) && self.config.comp1_irq {
            ctx.events.post(Event::TimerComp1);
        }
        if pending.contains(TimerIrq::UF) && self.config.underflow_irq {
            ctx.events.post(Event::TimerUnderflow);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn port(&self) -> &T {
        &self.timer
    }

    pub fn port_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
