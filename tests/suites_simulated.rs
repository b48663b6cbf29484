//! Integration tests running the test stages against the simulated device
//!
//! The simulator answers instantly, so every wait runs on
//! `TimingConfig::immediate()`. Quirked devices check that each stage
//! notices the misbehaviour it is meant to catch.

use wolksensor_harness::config::{HarnessConfig, TimingConfig};
use wolksensor_harness::error::HarnessError;
use wolksensor_harness::suites::{self, exit_code_for, Stage, EXIT_ABORTED, EXIT_FAILED, EXIT_PASSED};
use wolksensor_harness::transport::simulated::{Quirk, Reachable, SimulatedDevice};
use wolksensor_harness::transport::Transport;

fn config() -> HarnessConfig {
    HarnessConfig {
        timing: TimingConfig::immediate(),
        ..HarnessConfig::default()
    }
}

fn device(config: &HarnessConfig) -> SimulatedDevice {
    SimulatedDevice::new(Reachable::from(&config.network))
}

#[test]
fn every_stage_passes_on_a_conforming_device() {
    let config = config();
    let mut device = device(&config);

    let report = suites::run(&mut device, &config, &[]).unwrap();

    assert_eq!(report.stages.len(), Stage::ALL.len());
    assert_eq!(report.stage(Stage::DataDriven), Some(true));
    assert_eq!(report.stage(Stage::Flow), Some(true));
    assert_eq!(report.stage(Stage::Robustness), Some(true));
    assert_eq!(report.exit_code(), EXIT_PASSED);
}

#[test]
fn device_is_left_on_reference_settings() {
    let config = config();
    let mut device = device(&config);

    suites::run(&mut device, &config, &[Stage::Flow]).unwrap();

    assert_eq!(device.ssid(), config.network.ssid);
    assert_eq!(device.exchange("MOVEMENT;").unwrap(), "MOVEMENT OFF;");
    assert_eq!(device.exchange("ATMO;").unwrap(), "ATMO ON;");
    assert_eq!(device.exchange("STATIC_IP;").unwrap(), "STATIC_IP OFF;");
}

#[test]
fn stages_run_in_the_order_given() {
    let config = config();
    let mut device = device(&config);

    let report = suites::run(&mut device, &config, &[Stage::Robustness, Stage::DataDriven]).unwrap();

    let order: Vec<Stage> = report.stages.iter().map(|(stage, _)| *stage).collect();
    assert_eq!(order, vec![Stage::Robustness, Stage::DataDriven]);
    assert!(report.passed());
}

#[test]
fn data_driven_catches_out_of_range_port() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::LenientPort);

    let report = suites::run(&mut device, &config, &[Stage::DataDriven]).unwrap();

    assert_eq!(report.stage(Stage::DataDriven), Some(false));
    assert_eq!(report.exit_code(), EXIT_FAILED);
}

#[test]
fn flow_catches_offsets_not_applied_to_readings() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::IgnoreOffsets);

    let report = suites::run(&mut device, &config, &[Stage::Flow]).unwrap();

    assert_eq!(report.stage(Stage::Flow), Some(false));
    assert_eq!(report.exit_code(), EXIT_FAILED);
}

#[test]
fn flow_catches_factory_reset_that_keeps_offsets() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::ResetKeepsOffsets);

    let report = suites::run(&mut device, &config, &[Stage::Flow]).unwrap();

    assert_eq!(report.stage(Stage::Flow), Some(false));
}

#[test]
fn brownout_device_passes_the_flow() {
    let config = config();
    let mut device = device(&config).after_brownout();

    let report = suites::run(&mut device, &config, &[Stage::Flow]).unwrap();

    assert_eq!(report.stage(Stage::Flow), Some(true));
}

#[test]
fn data_driven_leaves_the_reference_endpoint() {
    let mut config = config();
    config.network.port = "1883".to_string();
    let mut device = device(&config);

    let report = suites::run(&mut device, &config, &[Stage::DataDriven]).unwrap();

    assert_eq!(report.stage(Stage::DataDriven), Some(true));
    assert_eq!(device.exchange("PORT;").unwrap(), "PORT 1883;");
    assert_eq!(device.exchange("URL;").unwrap(), format!("URL {};", config.network.hostname));
}

#[test]
fn robustness_catches_unbounded_buffer() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::UnboundedReadings);

    let report = suites::run(&mut device, &config, &[Stage::Robustness]).unwrap();

    assert_eq!(report.stage(Stage::Robustness), Some(false));
}

#[test]
fn silent_device_aborts_the_run() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::Silent);

    let err = suites::run(&mut device, &config, &[Stage::DataDriven]).unwrap_err();

    assert!(matches!(err, HarnessError::DeviceUnresponsive { .. }));
    assert_eq!(exit_code_for(&err), EXIT_ABORTED);
}

#[test]
fn stuck_connection_aborts_the_flow() {
    let config = config();
    let mut device = device(&config).with_quirk(Quirk::StuckConnecting);

    let err = suites::run(&mut device, &config, &[Stage::Flow]).unwrap_err();

    assert!(err.is_timeout());
}

#[test]
fn smaller_buffer_is_measured_against_configured_capacity() {
    let mut config = config();
    config.device.readings_capacity = 20;
    let mut device = device(&config).with_capacity(20);

    let report = suites::run(&mut device, &config, &[Stage::Robustness]).unwrap();

    assert_eq!(report.stage(Stage::Robustness), Some(true));
    assert_eq!(device.readings_len(), 0);
}
