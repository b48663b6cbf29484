//! Hardware smoke tests for a WolkSensor on the FTDI USB bridge
//!
//! These tests require a sensor connected to the host.
//! Run with: cargo test --test hardware_smoke --features hardware_tests -- --ignored --nocapture
//!
//! The port is found by VID/PID, or set explicitly with
//! `WOLKSENSOR_SERIAL__PORT=/dev/ttyUSB0`.

#![cfg(feature = "hardware_tests")]

use wolksensor_harness::config::HarnessConfig;
use wolksensor_harness::engine::Engine;
use wolksensor_harness::transport::serial::{close_serial, open_serial, PortOutcome, SerialTransport};

fn open(config: &HarnessConfig) -> SerialTransport {
    let mut input = std::io::empty();
    let mut output = std::io::sink();
    match open_serial(&config.serial, &mut input, &mut output).unwrap() {
        PortOutcome::Opened(transport) => transport,
        PortOutcome::Quit => panic!("no WolkSensor port found"),
        PortOutcome::Busy(name) => panic!("{} is open in another program", name),
    }
}

#[test]
#[ignore] // Hardware-only test
fn device_reports_identity() {
    let config = HarnessConfig::load(None).unwrap();
    let mut transport = open(&config);
    {
        let mut engine = Engine::new(&mut transport, &config);
        assert!(engine.protocol_parser("VERSION", false, "", true).unwrap());
        assert!(engine.protocol_parser("ID", false, "", true).unwrap());
        assert!(engine.protocol_parser("MAC", false, "", true).unwrap());
    }
    close_serial(transport);
}

#[test]
#[ignore] // Hardware-only test
fn device_settles_in_idle() {
    let config = HarnessConfig::load(None).unwrap();
    let mut transport = open(&config);
    {
        let mut engine = Engine::new(&mut transport, &config);
        engine.wait_dev_state_idle().unwrap();
        assert!(engine.test("STATUS", &[], &[]).unwrap());
    }
    close_serial(transport);
}
