//! ThermoBeacon: host simulation entry point.
//!
//! Wires the firmware library to simulated peripherals and runs the
//! event loop until a fixed number of samples have been reported:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SimSi7021Bus   SimSerial (+HM-10)   SimTimer   SimPin       │
//! │  ─────────────────── port traits ──────────────────────      │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  AppService: I2c · Ble(FrameRing, Leuart) · PwmTimer   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  static Context: EventSet · PowerManager                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `thermo-beacon [config.json]`.  `RUST_LOG` sets the log level.

use std::{env, fs};

use anyhow::{Context as _, Result, bail};
use log::{error, info};

use thermo_beacon::adapters::sim::{SimPin, SimSerial, SimSi7021Bus, SimSleep, SimTimer};
use thermo_beacon::app::service::{AppService, Peripherals};
use thermo_beacon::config::SystemConfig;
use thermo_beacon::context::Context;
use thermo_beacon::power::EnergyMode;

/// Shared with the (simulated) interrupt handlers.
static CTX: Context = Context::new();

const SAMPLES: u32 = 8;
/// The phone asks for Fahrenheit after this many readings.
const UNIT_SWITCH_AFTER: u32 = 3;
const MAX_STEPS: u32 = 1_000_000;

type SimApp = AppService<SimSi7021Bus, SimSerial, SimTimer, SimPin>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  ThermoBeacon v{:<22}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config()?;
    let hw = Peripherals {
        bus: SimSi7021Bus::new(),
        serial: SimSerial::new(),
        timer: SimTimer::new(),
        led: SimPin::new(),
    };
    let mut app = AppService::new(config, hw).context("invalid configuration")?;
    app.open(&CTX).context("peripheral bring-up failed")?;

    let mut sleep = SimSleep::new();
    let mut switched = false;
    let mut steps = 0;

    while app.stats().readings < SAMPLES {
        steps += 1;
        if steps > MAX_STEPS {
            bail!("simulation stalled after {} steps", MAX_STEPS);
        }

        if let Err(e) = step(&mut app, &mut sleep) {
            error!("fatal: {}, halting", e);
            return Err(e.into());
        }

        if !switched && app.stats().readings >= UNIT_SWITCH_AFTER {
            app.ble_mut().leuart_mut().port_mut().inject(b"#TEMPF!");
            switched = true;
        }
        if is_quiet(&app) {
            warm_up(&mut app);
            app.timer_mut().port_mut().elapse_period();
        }
    }

    report(&app, &sleep)
}

/// Interrupts, then one main-loop pass.
fn step(app: &mut SimApp, sleep: &mut SimSleep) -> thermo_beacon::error::Result<()> {
    app.service_interrupts(&CTX)?;
    app.run_once(&CTX, sleep)?;
    Ok(())
}

/// Nothing left for any handler until the next timer period.
fn is_quiet(app: &SimApp) -> bool {
    CTX.events.is_empty()
        && !app.i2c().bus().has_pending()
        && !app.ble().leuart().port().has_pending()
        && !app.timer().port().has_pending()
}

/// Drift the simulated room temperature a little each period.
fn warm_up(app: &mut SimApp) {
    let period = app.timer().port().periods();
    app.i2c_mut().bus_mut().set_celsius(20.0 + period as f32 * 1.5);
}

fn load_config() -> Result<SystemConfig> {
    let Some(path) = env::args().nth(1) else {
        info!("config: defaults");
        return Ok(SystemConfig::default());
    };
    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    info!("config: loaded {}", path);
    Ok(config)
}

fn report(app: &SimApp, sleep: &SimSleep) -> Result<()> {
    let radio = String::from_utf8_lossy(app.ble().leuart().port().radio_received()).into_owned();
    info!("radio output:{}", radio);
    info!("stats: {}", serde_json::to_string(&app.stats())?);
    if let Some(tests) = app.self_test_report() {
        info!("self-tests: {}", serde_json::to_string(&tests)?);
    }
    for mode in EnergyMode::ALL {
        let count = sleep.count(mode);
        if count > 0 {
            info!("slept in {}: {} times", mode, count);
        }
    }
    info!("LED {}", if app.led().is_lit() { "on" } else { "off" });
    Ok(())
}
