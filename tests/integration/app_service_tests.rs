//! Integration tests for the AppService event pipeline.
//!
//! Timer underflow → Si7021 transaction → conversion → LED + report line
//! → radio, plus unit commands coming back the other way.

use crate::mock_hw::Rig;

use thermo_beacon::adapters::sim::{SimSerial, SimSi7021Bus};
use thermo_beacon::app::commands::TempUnit;
use thermo_beacon::app::service::{AppService, Peripherals};
use thermo_beacon::config::SystemConfig;
use thermo_beacon::diagnostics::SelfTestReport;
use thermo_beacon::drivers::i2c::I2cState;
use thermo_beacon::error::{Error, Peripheral};
use thermo_beacon::events::Event;
use thermo_beacon::power::EnergyMode;

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_runs_self_tests_greets_and_starts_timer() {
    let mut rig = Rig::open(SystemConfig::default(), SimSi7021Bus::new(), SimSerial::new());
    assert!(rig.ctx.events.is_pending(Event::BootUp));
    assert!(!rig.app.timer().is_running());

    rig.settle().unwrap();

    assert_eq!(
        rig.app.self_test_report(),
        Some(SelfTestReport { loopback: true, ring: true, radio: false })
    );
    assert_eq!(rig.take_radio(), "\nHello World\nCircular Buffer Lab\nThermoBeacon\n");
    assert!(rig.app.timer().is_running(), "TX done starts the timer");
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em4), 1);
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em3), 1, "receiver stays armed");
    assert!(rig.app.ble().ring().is_empty());
}

#[test]
fn boot_without_messages_starts_timer_directly() {
    let config = SystemConfig {
        boot_messages: heapless::Vec::new(),
        self_test: false,
        ..SystemConfig::default()
    };
    let mut rig = Rig::open(config, SimSi7021Bus::new(), SimSerial::new());
    rig.step().unwrap();
    assert!(rig.app.timer().is_running());
    assert_eq!(rig.app.self_test_report(), Some(SelfTestReport::default()));
    assert!(rig.take_radio().is_empty());
}

#[test]
fn boot_renames_radio_when_configured() {
    let config = SystemConfig {
        radio_name: Some(heapless::String::try_from("THERMO").unwrap()),
        ..SystemConfig::default()
    };
    let mut rig = Rig::open(config, SimSi7021Bus::new(), SimSerial::new());
    rig.settle().unwrap();

    assert_eq!(rig.app.ble().leuart().port().radio_name(), "THERMO");
    assert!(rig.app.self_test_report().unwrap().radio);
    assert!(rig.take_radio().ends_with("AT+RESET\nHello World\nCircular Buffer Lab\nThermoBeacon\n"));
}

#[test]
fn silent_radio_halts_boot() {
    let config = SystemConfig {
        radio_name: Some(heapless::String::try_from("THERMO").unwrap()),
        ..SystemConfig::default()
    };
    let mut serial = SimSerial::new();
    serial.set_radio_silent(true);
    let mut rig = Rig::open(config, SimSi7021Bus::new(), serial);

    let err = rig.settle().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err, Error::SelfTest { test: "hm10", step: "AT" });
}

#[test]
fn invalid_config_is_rejected_before_bring_up() {
    let config = SystemConfig { pwm_active_secs: 10.0, ..SystemConfig::default() };
    let hw = Peripherals {
        bus: SimSi7021Bus::new(),
        serial: SimSerial::new(),
        timer: thermo_beacon::adapters::sim::SimTimer::new(),
        led: thermo_beacon::adapters::sim::SimPin::new(),
    };
    assert!(matches!(AppService::new(config, hw), Err(Error::Config(_))));
}

// ── Sampling ──────────────────────────────────────────────────

#[test]
fn sample_cycle_reports_celsius_by_default() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_raw(0x4E35);

    rig.sample().unwrap();

    assert_eq!(rig.take_radio(), "\nTempC =  6.8");
    assert_eq!(rig.app.stats().readings, 1);
    let reading = rig.app.last_reading().unwrap();
    assert_eq!(reading.raw, 0x4E35);
    assert_eq!(rig.app.i2c().state(), I2cState::Init);
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em2), 0);
    assert!(!rig.app.led().is_lit());
}

#[test]
fn conversion_naks_are_retried() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_conversion_naks(25);
    rig.sample().unwrap();
    assert_eq!(rig.app.i2c().retries(), 25);
    assert_eq!(rig.app.stats().readings, 1);
}

#[test]
fn every_period_produces_one_line() {
    let mut rig = Rig::booted(SystemConfig::default());
    for i in 0..5 {
        rig.bus_mut().set_celsius(20.0 + i as f32);
        rig.sample().unwrap();
    }
    let text = rig.take_radio();
    assert_eq!(text.matches("\nTempC = ").count(), 5);
    assert!(text.ends_with("24.0"), "{text:?}");
    assert_eq!(rig.app.stats().readings, 5);
}

// ── Unit commands ─────────────────────────────────────────────

#[test]
fn fahrenheit_command_switches_unit() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_raw(0x4E35);

    rig.phone_sends(b"#TEMPF!").unwrap();
    assert_eq!(rig.app.unit(), TempUnit::Fahrenheit);
    rig.sample().unwrap();
    assert_eq!(rig.take_radio(), "\nTempF = 44.3");

    rig.phone_sends(b"#TEMPC!").unwrap();
    assert_eq!(rig.app.unit(), TempUnit::Celsius);
    rig.sample().unwrap();
    assert_eq!(rig.take_radio(), "\nTempC =  6.8");
}

#[test]
fn noise_around_a_command_is_ignored() {
    let mut rig = Rig::booted(SystemConfig::default());
    let dropped_before = rig.app.ble().leuart().port().dropped();
    rig.phone_sends(b"hello#TEMPF!trailing").unwrap();
    assert_eq!(rig.app.unit(), TempUnit::Fahrenheit);
    assert_eq!(rig.app.ble().leuart().port().dropped() - dropped_before, 13);
}

#[test]
fn unknown_frames_leave_unit_alone() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.phone_sends(b"#TEMPK!").unwrap();
    rig.phone_sends(b"#tempf!").unwrap();
    assert_eq!(rig.app.unit(), TempUnit::Celsius);
    assert_eq!(rig.app.stats().ignored_frames, 2);
}

#[test]
fn default_unit_comes_from_config() {
    let config = SystemConfig { default_unit: TempUnit::Fahrenheit, ..SystemConfig::default() };
    let mut rig = Rig::booted(config);
    rig.bus_mut().set_raw(0x4E35);
    rig.sample().unwrap();
    assert_eq!(rig.take_radio(), "\nTempF = 44.3");
}

// ── LED ───────────────────────────────────────────────────────

#[test]
fn led_tracks_threshold() {
    let mut rig = Rig::booted(SystemConfig::default());

    rig.bus_mut().set_celsius(30.0); // 86 °F
    rig.sample().unwrap();
    assert!(rig.app.led().is_lit());
    assert!(rig.app.led().pin().is_high());

    rig.bus_mut().set_celsius(20.0); // 68 °F
    rig.sample().unwrap();
    assert!(!rig.app.led().is_lit());
    assert!(!rig.app.led().pin().is_high());
}

// ── Energy modes ──────────────────────────────────────────────

#[test]
fn idle_loop_sleeps_in_em2_with_receiver_armed() {
    let mut rig = Rig::booted(SystemConfig::default());
    assert_eq!(rig.step().unwrap(), Some(EnergyMode::Em2));
    assert_eq!(rig.sleep.entered.last(), Some(&EnergyMode::Em2));
}

#[test]
fn sensor_transaction_holds_em1() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.sleep.entered.clear();
    rig.sample().unwrap();
    assert!(rig.sleep.count(EnergyMode::Em1) > 0, "{:?}", rig.sleep.entered);
    assert_eq!(rig.ctx.power.current_floor(), EnergyMode::Em3);
}

#[test]
fn events_pending_skip_sleep() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.ctx.events.post(Event::TimerComp0);
    assert_eq!(rig.step().unwrap(), None);
    assert!(rig.ctx.events.is_empty());
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn retry_limit_aborts_and_recovers_next_period() {
    let config = SystemConfig { sensor_retry_limit: Some(4), ..SystemConfig::default() };
    let mut rig = Rig::booted(config);
    rig.bus_mut().set_conversion_naks(100);

    rig.sample().unwrap();
    assert_eq!(rig.app.stats().sensor_faults, 1);
    assert_eq!(rig.app.stats().readings, 0);
    assert_eq!(rig.app.i2c().state(), I2cState::Init);
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em2), 0);
    assert!(rig.take_radio().is_empty());

    rig.bus_mut().set_conversion_naks(1);
    rig.sample().unwrap();
    assert_eq!(rig.app.stats().readings, 1);
}

#[test]
fn missing_sensor_is_a_protocol_violation() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_address(0x41);

    let err = rig.sample().unwrap_err();
    assert!(err.is_fatal());
    match err {
        Error::Protocol(v) => {
            assert_eq!(v.peripheral, Peripheral::TwoWire);
            assert_eq!(v.state, "SendMeasure");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn overlapping_underflow_skips_the_sample() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_conversion_naks(50);
    assert!(rig.app.timer_mut().port_mut().elapse_period());
    // start the transaction but stop before it completes
    for _ in 0..4 {
        rig.step().unwrap();
    }
    assert!(rig.app.i2c().is_busy());

    assert!(rig.app.timer_mut().port_mut().elapse_period());
    rig.settle().unwrap();
    assert_eq!(rig.app.stats().skipped_samples, 1);
    assert_eq!(rig.app.stats().readings, 1);
}

#[test]
fn underflow_while_waiting_for_stop_skips_the_sample() {
    let mut rig = Rig::booted(SystemConfig::default());
    rig.bus_mut().set_conversion_naks(0);
    rig.bus_mut().set_raw(0x4E35);
    assert!(rig.app.timer_mut().port_mut().elapse_period());

    let mut steps = 0;
    while rig.app.i2c().state() != I2cState::GetLsbStop {
        rig.step().unwrap();
        steps += 1;
        assert!(steps < 20, "transaction never reached the LSB read");
    }

    // LSB and MSTOP still to come when the next period ends
    assert!(rig.app.timer_mut().port_mut().elapse_period());
    rig.step().unwrap();
    assert_eq!(rig.app.i2c().state(), I2cState::End);
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em2), 1);

    rig.settle().unwrap();
    assert_eq!(rig.app.stats().skipped_samples, 1);
    assert_eq!(rig.app.stats().readings, 1);
    assert_eq!(rig.app.i2c().state(), I2cState::Init);
    assert_eq!(rig.ctx.power.block_count(EnergyMode::Em2), 0);
}
