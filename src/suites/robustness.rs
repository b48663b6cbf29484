//! Robustness stage: malformed input, writes during a connection attempt,
//! reads during movement, and readings buffer saturation.

use super::flow::restore_reference;
use super::scenario;
use crate::config::HarnessConfig;
use crate::engine::Engine;
use crate::error::AppResult;
use crate::report;
use crate::transport::Transport;
use tracing::{debug, error};

/// Unsolicited status that opens a connection attempt.
const CONNECTING_MARKER: &str = "STATUS CONNECTING_TO_AP;";

/// Well-formed queries, concatenated.
const QUERIES: &str = "SIGNATURE;STATIC_DNS;VERSION;PASS;MOVEMENT;SSID;STATIC_IP;READINGS;SYSTEM;URL;PORT;STATUS;";

/// Queries sent while the device is connecting. The last one is left
/// unterminated and must be ignored.
const QUERIES_DURING_CONNECTION: &str =
    "SIGNATURE;STATIC_DNS;VERSION;PASS;MOVEMENT;SSID;STATIC_IP;MAC;HEARTBEAT;RTC;AUTH;PASS;TEMP_OFFSET;ID;STATUS;OFFSET_FACTORY";

/// Writes sent while the device is connecting; `BUSY;` is a graceful answer.
const WRITES_DURING_CONNECTION: &str = "STATIC_DNS 89.89.89.90;PASS mypassword;OFFSET_FACTORY RESET;SSID myssid;STATIC_IP 192.168.24.23;HEARTBEAT 35;RTC 12356789;AUTH NONE;";

const QUERIES_AFTER_CONNECTION: &str =
    "SIGNATURE;STATIC_DNS;VERSION;PASS;MOVEMENT;SSID;STATIC_IP;MAC;HEARTBEAT;RTC;AUTH;PASS;ID;STATUS;";

const QUERIES_DURING_MOVEMENT: &str = "SIGNATURE;STATIC_DNS;VERSION;PRESSURE_OFFSET;PASS;MOVEMENT;SSID;STATIC_IP;MAC;HEARTBEAT;RTC;AUTH;OFFSET_FACTORY;PASS;ID;STATUS;";

/// Misspelled commands sent while movement is being processed.
const MALFORMED_DURING_MOVEMENT: &str = "P0RT;ST4TIC_DNS;V3RS1ON;ATM0;HEARTBEATMAC;7422;MOVEMENTBRE;SSID123SSID;ST4TUS;";

/// Input every reply to which must be a rejection.
const MALFORMED: &[&str] = &[
    "PORT;;",
    "PORT1;",
    "qPORT;",
    "PORT;ST4TIC_DNS;V3RS1ON;ATMO;HEARTBEATMAC;7422;MOVEMENT;SSID123SSID;STATIC_IP;STATUS;",
    "everything;is;WRONG;here.;THIS;;TEST;will;pass;STATUS;",
];

/// Extra acquisitions beyond capacity in the overflow run.
const OVERFLOW_EXTRA: usize = 10;

/// A 26-digit key for a network that does not exist.
const UNKNOWN_WEP_KEY: &str = "FA7EA4603E27FA7EA4603E27FA";

/// Runs the malformed input, busy write and saturation scenarios.
pub fn run<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;

    engine.wait_dev_state_idle()?;
    engine.ensure("MOVEMENT OFF", |e| e.protocol_parser("MOVEMENT", true, "OFF", true))?;

    passed &= scenario("Send set of commands", || command_sets(engine))?;
    passed &= scenario("Read/Write values during connection", || during_connection(engine, config))?;
    passed &= scenario("Read during movement", || during_movement(engine, config))?;
    passed &= scenario("Buffer size test with ACQUISITION", || buffer_saturation(engine, config))?;

    report!("Return WolkSensor to settings before the test was started");
    engine.wait_dev_state_idle()?;
    restore_reference(engine, config)?;
    Ok(passed)
}

fn command_sets<T: Transport + ?Sized>(engine: &mut Engine<'_, T>) -> AppResult<bool> {
    report!("---True---");
    engine.wait_dev_state_idle()?;
    let wanted = engine.check_commands(&[QUERIES], true)?;

    report!("---False---");
    engine.wait_dev_state_idle()?;
    let rejected = engine.check_commands(MALFORMED, false)?;
    Ok(wanted && rejected)
}

fn during_connection<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;
    let network = &config.network;

    report!("---True---");
    passed &= engine.set_wifi_parameters("fakeargumentssid", "NONE", "fakeargumentpass")?;
    passed &= engine.check_commands(&["NOW;", QUERIES_DURING_CONNECTION], true)?;

    report!("---False---");
    engine.wait_dev_state_idle()?;
    passed &= engine.check_commands(&["NOW;", WRITES_DURING_CONNECTION], true)?;

    report!("---True---");
    engine.wait_dev_state_idle()?;
    passed &= engine.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)?;
    engine.wait_dev_state_idle()?;
    passed &= engine.check_commands(&["NOW;"], true)?;
    passed &= engine.check_commands(&[QUERIES_AFTER_CONNECTION], true)?;
    Ok(passed)
}

fn during_movement<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;
    let network = &config.network;
    let timeout = engine.timing().movement_timeout;

    report!("---True---");
    engine.wait_dev_state_idle()?;
    passed &= engine.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)?;
    passed &= engine.protocol_parser("MOVEMENT", true, "ON", true)?;
    report!("-->MOVE WolkSensor to continue testing<--");
    passed &= engine.wait_for_event(CONNECTING_MARKER, timeout)?;
    passed &= engine.check_commands(&[QUERIES_DURING_MOVEMENT], true)?;
    passed &= engine.check_commands(&[MALFORMED_DURING_MOVEMENT], false)?;

    report!("---False---");
    engine.wait_dev_state_idle()?;
    passed &= engine.set_wifi_parameters("fakeargumentssid", "WEP", UNKNOWN_WEP_KEY)?;
    passed &= engine.protocol_parser("MOVEMENT", true, "ON", true)?;
    report!("-->MOVE WolkSensor to continue testing<--");
    passed &= engine.wait_for_event(CONNECTING_MARKER, timeout)?;
    passed &= engine.check_commands(&[QUERIES_DURING_MOVEMENT], true)?;
    passed &= engine.check_commands(&[MALFORMED_DURING_MOVEMENT], false)?;

    engine.wait_dev_state_idle()?;
    passed &= engine.protocol_parser("MOVEMENT", true, "OFF", true)?;
    engine.ensure("reference Wi-Fi", |e| {
        e.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)
    })?;
    passed &= engine.check_commands(&["NOW;"], true)?;
    Ok(passed)
}

fn buffer_saturation<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;
    let network = &config.network;
    let capacity = config.device.readings_capacity;

    report!("---True---");
    engine.wait_dev_state_idle()?;
    engine.ensure("reference Wi-Fi", |e| {
        e.set_wifi_parameters(&network.ssid, &network.auth, &network.pass)
    })?;
    passed &= engine.check_commands(&["ATMO ON;"], true)?;
    passed &= engine.readings_accepted("CLEAR")?;

    passed &= fill_and_count(engine, capacity, capacity)?;
    report!("Made more[{}] ACQUISITIONs than buffer can store[{}]", capacity + OVERFLOW_EXTRA, capacity);
    passed &= fill_and_count(engine, capacity + OVERFLOW_EXTRA, capacity)?;
    Ok(passed)
}

/// Sends `acquisitions` bare `ACQUISITION;` commands, then checks that
/// `READINGS` holds exactly `capacity` entries and clears the buffer.
fn fill_and_count<T: Transport + ?Sized>(
    engine: &mut Engine<'_, T>,
    acquisitions: usize,
    capacity: usize,
) -> AppResult<bool> {
    for counter in 0..acquisitions {
        if !engine.test("ACQUISITION", &[], &[])? {
            error!(counter, "ACQUISITION was not acknowledged");
            return Ok(false);
        }
        debug!(counter, "ACQUISITION sent");
    }

    engine.wait_dev_state_idle()?;
    let Some(outcome) = engine.parse_readings("")? else {
        return Ok(false);
    };
    let count = outcome.len();
    let full = match count.cmp(&capacity) {
        std::cmp::Ordering::Equal => {
            report!(
                "The Buffer is full. Number of readings is {} which is equal to buffer size. SUCCESSFULLY FILLED BUFFER",
                count
            );
            true
        }
        std::cmp::Ordering::Less => {
            error!(count, capacity, "Number of readings is smaller than full MAX buffer size");
            false
        }
        std::cmp::Ordering::Greater => {
            error!(count, capacity, "Number of readings is bigger than full MAX buffer size");
            false
        }
    };

    let cleared = engine.readings_accepted("CLEAR")?;
    Ok(full && cleared)
}
