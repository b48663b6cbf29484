//! Flow stage: ordered device-state scenarios.
//!
//! Each scenario configures the device, waits for `IDLE`, triggers an action
//! and checks the outcome. The stage starts and ends on the reference
//! credentials with `MOVEMENT OFF`, `ATMO ON` and `STATIC_IP OFF`.

use super::scenario;
use crate::config::HarnessConfig;
use crate::engine::retry::countdown;
use crate::engine::{Engine, SensorTriple};
use crate::error::AppResult;
use crate::protocol::{Command, ReadingsOutcome};
use crate::report;
use crate::transport::Transport;
use tracing::{debug, error};

/// `NOW` attempts before the reference network counts as unreachable.
const CONNECT_ATTEMPTS: u32 = 3;

/// Runs the scenarios in order, starting and ending on reference settings.
pub fn run<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;

    restore_reference(engine, config)?;

    passed &= scenario("Set Wi-Fi", || set_wifi_flow(engine))?;
    passed &= scenario("Read readings", || readings_flow(engine))?;
    passed &= scenario("Offset settings", || offset_flow(engine))?;
    passed &= scenario("Read movement", || movement_flow(engine))?;
    passed &= scenario("Read system readings", || system_flow(engine, config))?;
    passed &= scenario("Factory offset settings", || factory_offset_flow(engine))?;

    engine.wait_dev_state_idle()?;
    restore_reference(engine, config)?;
    Ok(passed)
}

/// Reference credentials, no movement sensing, atmosphere sensing on, DHCP.
pub(crate) fn restore_reference<T: Transport + ?Sized>(
    engine: &mut Engine<'_, T>,
    config: &HarnessConfig,
) -> AppResult<()> {
    let network = &config.network;
    engine.ensure("reference Wi-Fi", |e| {
        e.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)
    })?;
    engine.ensure("MOVEMENT OFF", |e| e.protocol_parser("MOVEMENT", true, "OFF", true))?;
    engine.ensure("ATMO ON", |e| e.protocol_parser("ATMO", true, "ON", true))?;
    engine.ensure("STATIC_IP OFF", |e| e.protocol_parser("STATIC_IP", true, "OFF", true))?;
    Ok(())
}

fn set_wifi_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    let mut passed = true;

    report!("---True flow---");
    if !engine.test_now()? {
        error!("Reference network did not connect");
        passed = false;
    }

    report!("---False flow---");
    passed &= engine.set_wifi_parameters("my0penwl4n", "NONE", "NULL")?;
    if engine.test_now()? {
        error!("Unknown network reported a successful connection");
        passed = false;
    }
    Ok(passed)
}

fn readings_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    let mut passed = true;

    report!("---True flow---");
    engine.wait_dev_state_idle()?;
    engine.ensure("clear Wi-Fi", |e| e.clear_wifi_parameters())?;
    passed &= engine.test("MOVEMENT", &["OFF"], &[])?;
    passed &= engine.test("ATMO", &["ON"], &[])?;
    passed &= engine.readings_accepted("CLEAR")?;

    report!("set ACQUISITION state");
    passed &= engine.test("ACQUISITION", &[], &[])?;
    passed &= engine.readings_accepted("CLEAR")?;

    report!("RELOAD WolkSensor, waiting for STATUS ACQUISITION");
    let reload = engine.send_command(&Command::query("RELOAD"))?;
    debug!(reply = reload.raw(), "RELOAD sent");
    engine.wait_dev_state_idle()?;
    passed &= engine.readings_accepted("")?;

    report!("CLEAR and OFF atmo measurements");
    passed &= engine.test("ATMO", &["OFF"], &[])?;
    passed &= engine.readings_accepted("CLEAR")?;
    countdown(engine.timing().acquisition_period, "wait to countdown ACQUISITION period");
    match engine.parse_readings("")? {
        Some(ReadingsOutcome::Empty) => {}
        other => {
            error!(outcome = ?other, "READINGS should be empty while ATMO is OFF");
            passed = false;
        }
    }
    Ok(passed)
}

fn offset_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    let mut passed = true;

    report!("---True flow---");
    passed &= engine.test("ATMO", &["ON"], &[])?;

    let Some(baseline) = sample_with_offsets(engine, 0.0, 0.0, 0.0, &mut passed)? else {
        return Ok(false);
    };
    report!("SET NEW OFFSET VALUES");
    let Some(shifted) = sample_with_offsets(engine, 1.0, 2.0, 3.0, &mut passed)? else {
        return Ok(false);
    };

    let applied = SensorTriple {
        pressure: 1.0,
        temperature: 2.0,
        humidity: 3.0,
    };
    if offsets_applied(&baseline, &shifted, &applied, engine.device().offset_tolerance) {
        report!("SUCCESSFUL ARE SETS NEW OFFSET VALUES");
    } else {
        error!(?baseline, ?shifted, ?applied, "Readings did not shift by the applied offsets");
        passed = false;
    }
    Ok(passed)
}

/// Sets the offsets, takes one fresh sample and returns it.
fn sample_with_offsets<T: Transport + ?Sized>(
    engine: &mut Engine<'_, T>,
    pressure: f64,
    temperature: f64,
    humidity: f64,
    passed: &mut bool,
) -> AppResult<Option<SensorTriple>> {
    *passed &= engine.set_offsets(pressure, temperature, humidity)?;
    *passed &= engine.readings_accepted("CLEAR")?;
    report!("set ACQUISITION state");
    *passed &= engine.test("ACQUISITION", &[], &[])?;
    engine.read_sensor_triple()
}

/// Every channel moved by its applied offset, within `tolerance`.
pub fn offsets_applied(before: &SensorTriple, after: &SensorTriple, applied: &SensorTriple, tolerance: f64) -> bool {
    let delta = after.delta(before);
    (delta.pressure - applied.pressure).abs() <= tolerance
        && (delta.temperature - applied.temperature).abs() <= tolerance
        && (delta.humidity - applied.humidity).abs() <= tolerance
}

fn movement_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    let mut passed = true;

    report!("---True flow---");
    engine.wait_dev_state_idle()?;
    passed &= engine.test("MOVEMENT", &["ON"], &[])?;
    passed &= engine.test("ATMO", &["OFF"], &[])?;
    passed &= engine.clear_wifi_parameters()?;
    passed &= engine.readings_accepted("CLEAR")?;

    report!("-->MOVE WolkSensor to continue testing<--");
    let timeout = engine.timing().movement_timeout;
    passed &= engine.wait_for_movement(timeout)?;
    passed &= engine.readings_accepted("")?;

    engine.wait_dev_state_idle()?;
    passed &= engine.test("MOVEMENT", &["OFF"], &[])?;
    passed &= engine.readings_accepted("CLEAR")?;
    report!("-->MOVE WolkSensor to continue testing<--");
    countdown(engine.timing().movement_window, "move WolkSensor in this time period");
    passed &= engine.readings_accepted("")?;
    passed &= engine.test("ATMO", &["ON"], &[])?;
    Ok(passed)
}

fn system_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;
    let network = &config.network;

    report!("---True flow---");
    engine.wait_dev_state_idle()?;
    passed &= engine.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)?;
    passed &= engine.system_accepted("CLEAR")?;

    report!("---NOW---");
    let mut connected = false;
    for attempt in 1..=CONNECT_ATTEMPTS {
        engine.wait_dev_state_idle()?;
        if engine.test_now()? {
            connected = true;
            break;
        }
        debug!(attempt, "Reference network did not connect, retrying");
    }
    if !connected {
        error!(attempts = CONNECT_ATTEMPTS, "Reference network never connected");
        passed = false;
    }
    passed &= engine.system_accepted("")?;

    report!("---False flow---");
    engine.wait_dev_state_idle()?;
    passed &= engine.set_wifi_parameters("doesnotexist", "WPA", "doesnotexist")?;
    passed &= engine.system_accepted("CLEAR")?;

    report!("---NOW---");
    engine.wait_dev_state_idle()?;
    if engine.test_now()? {
        error!("Unknown network reported a successful connection");
        passed = false;
    }
    engine.wait_dev_state_idle()?;
    passed &= engine.system_accepted("")?;
    Ok(passed)
}

fn factory_offset_flow<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    let mut passed = true;

    engine.ensure("clear Wi-Fi", |e| e.clear_wifi_parameters())?;
    engine.wait_dev_state_idle()?;
    passed &= engine.set_offsets(-10.0, -2.0, 1.5)?;

    let Some(factory) = engine.query_value("OFFSET_FACTORY")? else {
        error!("OFFSET_FACTORY did not report a baseline");
        return Ok(false);
    };
    debug!(factory = %factory, "Factory baseline");

    passed &= engine.test("OFFSET_FACTORY", &["RESET"], &[])?;

    let temperature = engine.query_value("TEMP_OFFSET")?.unwrap_or_default();
    let humidity = engine.query_value("HUMIDITY_OFFSET")?.unwrap_or_default();
    let pressure = engine.query_value("PRESSURE_OFFSET")?.unwrap_or_default();
    let offsets = format!("P:{},T:{},H:{}", pressure, temperature, humidity);

    report!("{}", factory);
    report!("{}", offsets);
    if factory.trim() == offsets {
        report!("SUCCESSFUL RESET TO FACTORY OFFSET");
    } else {
        error!(%factory, %offsets, "Offsets after reset differ from the factory baseline");
        passed = false;
    }
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(pressure: f64, temperature: f64, humidity: f64) -> SensorTriple {
        SensorTriple {
            pressure,
            temperature,
            humidity,
        }
    }

    #[test]
    fn all_three_deltas_must_fit() {
        let before = triple(1001.2, 22.5, 40.0);
        let applied = triple(1.0, 2.0, 3.0);
        assert!(offsets_applied(&before, &triple(1002.23, 24.47, 43.1), &applied, 0.5));
        assert!(!offsets_applied(&before, &triple(1002.2, 24.5, 40.0), &applied, 0.5));
        assert!(!offsets_applied(&before, &before, &applied, 0.5));
    }
}
