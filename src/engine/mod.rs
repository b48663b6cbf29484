//! Command/assertion engine.
//!
//! [`Engine`] wraps a [`Transport`] and turns raw exchanges into verdicts:
//!
//! - [`Engine::test`] sets each accepted and rejected value and checks the read-back
//! - [`Engine::protocol_parser`] covers read-only fields and split set/verify steps
//! - [`Engine::wait_dev_state_idle`], [`Engine::test_now`] and
//!   [`Engine::wait_for_event`] synchronise with the device's state machine
//!
//! Verdicts are `AppResult<bool>`. `Ok(false)` means at least one discrepancy
//! was logged at `error` level; `Err` means the run cannot continue.

/// Bounded retries and countdowns.
pub mod retry;

use crate::config::{DeviceConfig, HarnessConfig, TimingConfig};
use crate::error::{AppResult, HarnessError};
use crate::protocol::command::NULL_ARGUMENT;
use crate::protocol::response::{BAD_REQUEST, DONE};
use crate::protocol::{
    classify, extract_field, Access, Command, DeviceStatus, Frame, Parameter, ReadingsOutcome,
    RecordSchema, READINGS_SCHEMA, SYSTEM_SCHEMA,
};
use crate::report;
use crate::transport::Transport;
use retry::{retry_until, RetryPolicy};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Attempts granted to setup steps that the device may transiently refuse.
const SETUP_ATTEMPTS: u32 = 5;

/// Key of the movement sample in a readings entry.
const MOVEMENT_FIELD: char = 'M';

/// Pressure, temperature and humidity from one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorTriple {
    /// hPa
    pub pressure: f64,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

impl SensorTriple {
    /// Component-wise `self - earlier`.
    pub fn delta(&self, earlier: &SensorTriple) -> SensorTriple {
        SensorTriple {
            pressure: self.pressure - earlier.pressure,
            temperature: self.temperature - earlier.temperature,
            humidity: self.humidity - earlier.humidity,
        }
    }
}

/// Drives one device through a [`Transport`] and judges its replies.
///
/// Timeouts come from [`TimingConfig`] and expected identity values from
/// [`DeviceConfig`].
pub struct Engine<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    timing: TimingConfig,
    device: DeviceConfig,
}

impl<'t, T: Transport + ?Sized> Engine<'t, T> {
    /// Borrows the transport for the lifetime of the engine.
    pub fn new(transport: &'t mut T, config: &HarnessConfig) -> Self {
        Self {
            transport,
            timing: config.timing.clone(),
            device: config.device.clone(),
        }
    }

    /// Waits in effect.
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Expected device properties.
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Sends raw text and parses whatever comes back.
    pub fn exchange(&mut self, text: &str) -> AppResult<Frame> {
        let raw = self.transport.exchange(text)?;
        Ok(Frame::parse(&raw))
    }

    /// Sends one command and parses the reply.
    pub fn send_command(&mut self, command: &Command) -> AppResult<Frame> {
        self.exchange(&command.to_wire())
    }

    /// Reads without sending, for unsolicited status changes.
    pub fn listen(&mut self) -> AppResult<Frame> {
        let raw = self.transport.receive()?;
        Ok(Frame::parse(&raw))
    }

    /// Queries a parameter. `None` when the reply carries no token for it.
    pub fn query_value(&mut self, name: &str) -> AppResult<Option<String>> {
        let frame = self.send_command(&Command::query(name))?;
        Ok(frame
            .token(name)
            .map(|token| token.payload.clone().unwrap_or_default()))
    }

    /// Sets every accepted and every rejected value and checks what the
    /// device stored. All values are tried even after a failure.
    #[instrument(skip(self), level = "debug")]
    pub fn test(&mut self, name: &str, accepted: &[&str], rejected: &[&str]) -> AppResult<bool> {
        let Some(parameter) = Parameter::lookup(name) else {
            error!(parameter = name, "Unknown parameter");
            return Ok(false);
        };

        if accepted.is_empty() && rejected.is_empty() {
            return self.check_bare(parameter);
        }

        let mut passed = true;
        for value in accepted {
            let ok = if parameter.has_read_back() {
                self.check_accepted(parameter, value)?
            } else {
                self.check_acknowledged(parameter, value)?
            };
            passed &= ok;
        }
        for value in rejected {
            let ok = if parameter.has_read_back() {
                self.check_rejected(parameter, value)?
            } else {
                self.check_refused(parameter, value)?
            };
            passed &= ok;
        }
        Ok(passed)
    }

    fn check_bare(&mut self, parameter: &Parameter) -> AppResult<bool> {
        let frame = self.send_command(&Command::query(parameter.name))?;
        match classify(&frame) {
            None => {
                report!("{} -> {}", parameter.name, frame.raw());
                Ok(true)
            }
            Some(reason) => {
                error!(parameter = parameter.name, ?reason, reply = frame.raw(), "Command was not acknowledged");
                Ok(false)
            }
        }
    }

    fn check_accepted(&mut self, parameter: &Parameter, value: &str) -> AppResult<bool> {
        let frame = self.send_command(&Command::set(parameter.name, value))?;
        if let Some(reason) = classify(&frame) {
            error!(
                parameter = parameter.name,
                value = %value.escape_default(),
                ?reason,
                reply = frame.raw(),
                "Valid value was refused"
            );
            return Ok(false);
        }

        let stored = self.query_value(parameter.name)?;
        if parameter
            .kind
            .matches(value, stored.as_deref(), self.timing.rtc_tolerance)
        {
            report!("{} {} accepted", parameter.name, value.escape_default());
            Ok(true)
        } else {
            error!(
                parameter = parameter.name,
                expected = %value.escape_default(),
                actual = ?stored,
                "Read-back does not match the value set"
            );
            Ok(false)
        }
    }

    fn check_rejected(&mut self, parameter: &Parameter, value: &str) -> AppResult<bool> {
        let prior = self.query_value(parameter.name)?;
        let frame = self.send_command(&Command::set(parameter.name, value))?;
        let refused = frame.has_word(BAD_REQUEST);
        let after = self.query_value(parameter.name)?;

        let tolerance = self.timing.rtc_tolerance;
        let unchanged = prior
            .as_deref()
            .is_some_and(|prior| parameter.kind.matches(prior, after.as_deref(), tolerance));
        let stored_anyway = parameter.kind.matches(value, after.as_deref(), tolerance);

        if after.is_some() && (unchanged || (refused && !stored_anyway)) {
            report!("{} {} rejected", parameter.name, value.escape_default());
            Ok(true)
        } else {
            error!(
                parameter = parameter.name,
                value = %value.escape_default(),
                prior = ?prior,
                actual = ?after,
                reply = frame.raw(),
                "Invalid value was stored"
            );
            Ok(false)
        }
    }

    /// Action arguments have no read-back; acknowledgement is all there is.
    fn check_acknowledged(&mut self, parameter: &Parameter, value: &str) -> AppResult<bool> {
        let frame = self.send_command(&Command::set(parameter.name, value))?;
        match classify(&frame) {
            None => {
                report!("{} {} acknowledged", parameter.name, value.escape_default());
                Ok(true)
            }
            Some(reason) => {
                error!(
                    parameter = parameter.name,
                    value = %value.escape_default(),
                    ?reason,
                    reply = frame.raw(),
                    "Valid argument was refused"
                );
                Ok(false)
            }
        }
    }

    fn check_refused(&mut self, parameter: &Parameter, value: &str) -> AppResult<bool> {
        let frame = self.send_command(&Command::set(parameter.name, value))?;
        if frame.has_word(BAD_REQUEST) {
            report!("{} {} refused", parameter.name, value.escape_default());
            Ok(true)
        } else {
            error!(
                parameter = parameter.name,
                value = %value.escape_default(),
                reply = frame.raw(),
                "Invalid argument was not refused"
            );
            Ok(false)
        }
    }

    /// Lower-level check with a separate set and verify step.
    ///
    /// Without `should_set` only a bare query is issued; with `should_verify`
    /// its reply must be well formed for the parameter. With `should_set` a
    /// read-only parameter must refuse the write, any other parameter must
    /// accept it, and `should_verify` adds a read-back.
    #[instrument(skip(self), level = "debug")]
    pub fn protocol_parser(
        &mut self,
        name: &str,
        should_set: bool,
        value: &str,
        should_verify: bool,
    ) -> AppResult<bool> {
        let Some(parameter) = Parameter::lookup(name) else {
            error!(parameter = name, "Unknown parameter");
            return Ok(false);
        };

        if !should_set {
            let frame = self.send_command(&Command::query(name))?;
            if let Some(reason) = classify(&frame) {
                error!(parameter = name, ?reason, reply = frame.raw(), "Query was not answered");
                return Ok(false);
            }
            if !should_verify {
                return Ok(true);
            }
            let reported = frame.token(name).map(|t| t.payload.clone().unwrap_or_default());
            return Ok(self.well_formed(parameter, reported.as_deref()));
        }

        match parameter.access {
            Access::ReadOnly => {
                let prior = if should_verify { self.query_value(name)? } else { None };
                let frame = self.send_command(&Command::set(name, value))?;
                if !frame.has_word(BAD_REQUEST) {
                    error!(parameter = name, value, reply = frame.raw(), "Read-only parameter accepted a write");
                    return Ok(false);
                }
                if should_verify {
                    let after = self.query_value(name)?;
                    if after != prior {
                        error!(parameter = name, ?prior, ?after, "Read-only parameter changed");
                        return Ok(false);
                    }
                }
                report!("{} is read-only", name);
                Ok(true)
            }
            Access::ReadWrite if should_verify => self.check_accepted(parameter, value),
            _ => self.check_acknowledged(parameter, value),
        }
    }

    fn well_formed(&self, parameter: &Parameter, reported: Option<&str>) -> bool {
        let Some(reported) = reported.map(str::trim) else {
            error!(parameter = parameter.name, "Reply carries no value");
            return false;
        };
        let ok = match parameter.name {
            "ID" => reported.len() == self.device.id_length,
            "MAC" => {
                reported.len() == self.device.mac_length
                    && reported.chars().all(|c| c.is_ascii_hexdigit())
            }
            "SIGNATURE" => reported == self.device.signature,
            "STATUS" => !matches!(DeviceStatus::parse(reported), DeviceStatus::Other(_)),
            _ => !reported.is_empty() && parameter.kind.normalize(Some(reported)).is_some(),
        };
        if ok {
            report!("{} {}", parameter.name, reported);
        } else {
            error!(parameter = parameter.name, reported, "Malformed value");
        }
        ok
    }

    /// Polls `STATUS` until the device reports `IDLE` (or `BROWNOUT`).
    ///
    /// Gives up after `timing.idle_timeout` with
    /// [`HarnessError::DeviceUnresponsive`].
    pub fn wait_dev_state_idle(&mut self) -> AppResult<()> {
        let policy = RetryPolicy::for_window(self.timing.idle_timeout, self.timing.poll_interval);
        let attempts = retry_until(&policy, "STATUS IDLE", || {
            let frame = self.send_command(&Command::query("STATUS"))?;
            Ok(frame.statuses().last().is_some_and(|status| status.is_idle()))
        })?;
        debug!(attempts, "Device is idle");
        Ok(())
    }

    /// Triggers `NOW` and follows the connection attempt.
    ///
    /// True once a connecting state was seen and the device settled back in
    /// `IDLE`. False on a refused `NOW`, a `STATUS ERROR`, or when
    /// `timing.connect_timeout` runs out.
    #[instrument(skip(self), level = "debug")]
    pub fn test_now(&mut self) -> AppResult<bool> {
        let mut frame = self.send_command(&Command::query("NOW"))?;
        if !frame.has_word(DONE) {
            error!(reply = frame.raw(), "NOW was not accepted");
            return Ok(false);
        }

        let deadline = Instant::now() + self.timing.connect_timeout;
        let mut connecting = false;
        loop {
            for status in frame.statuses() {
                match status {
                    DeviceStatus::Error(code) => {
                        report!("Connection failed with error {}", code);
                        return Ok(false);
                    }
                    status if status.is_idle() && connecting => {
                        report!("Connection attempt completed");
                        return Ok(true);
                    }
                    status if status.is_connecting() => {
                        debug!(status = %status.as_wire(), "Connecting");
                        connecting = true;
                    }
                    _ => {}
                }
            }
            if Instant::now() >= deadline {
                error!(timeout = ?self.timing.connect_timeout, "Connection attempt did not finish");
                return Ok(false);
            }
            std::thread::sleep(self.timing.poll_interval);
            frame = self.send_command(&Command::query("STATUS"))?;
        }
    }

    /// Listens passively until a reply contains `marker`.
    ///
    /// Used where the operator has to act (move the device). Running out of
    /// `timeout` is logged and returns false.
    pub fn wait_for_event(&mut self, marker: &str, timeout: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.listen()?;
            if frame.raw().contains(marker) {
                debug!(marker, "Event received");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                error!(marker, ?timeout, "Event did not arrive");
                return Ok(false);
            }
            std::thread::sleep(self.timing.poll_interval);
        }
    }

    /// Polls `READINGS` until a sample carries the movement field `M`.
    pub fn wait_for_movement(&mut self, timeout: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.send_command(&Command::query(READINGS_SCHEMA.name))?;
            let movement = READINGS_SCHEMA.field_type(MOVEMENT_FIELD);
            match extract_field(frame.raw(), MOVEMENT_FIELD, movement) {
                Ok(Some(value)) => {
                    report!("Movement detected, M:{}", value.as_string());
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(reply = frame.raw(), %e, "Undecodable movement sample");
                    return Ok(false);
                }
            }
            if Instant::now() >= deadline {
                error!(?timeout, "Movement event did not arrive");
                return Ok(false);
            }
            std::thread::sleep(self.timing.poll_interval);
        }
    }

    /// Sets SSID, AUTH and PASS in that order, each verified by read-back.
    ///
    /// AUTH goes before PASS since the device checks a WEP key against the
    /// active mode.
    pub fn set_wifi_parameters(&mut self, ssid: &str, auth: &str, pass: &str) -> AppResult<bool> {
        let ssid_ok = self.test("SSID", &[ssid], &[])?;
        let auth_ok = self.test("AUTH", &[auth], &[])?;
        let pass_ok = self.test("PASS", &[pass], &[])?;
        Ok(ssid_ok && auth_ok && pass_ok)
    }

    /// Runs `step` until it reports success, at most a few times.
    ///
    /// For setup and restore steps where a transient `BUSY;` is expected.
    pub fn ensure<F>(&mut self, what: &str, mut step: F) -> AppResult<()>
    where
        F: FnMut(&mut Self) -> AppResult<bool>,
    {
        let policy = RetryPolicy {
            backoff_delay: self.timing.poll_interval,
            ..RetryPolicy::default()
        }
        .with_max_attempts(SETUP_ATTEMPTS);
        retry_until(&policy, what, || step(self)).map(|_| ())
    }

    /// `READINGS` with an optional argument; empty means a bare query.
    ///
    /// `None` when the reply could not be decoded, which is logged.
    pub fn parse_readings(&mut self, argument: &str) -> AppResult<Option<ReadingsOutcome>> {
        self.parse_records(&READINGS_SCHEMA, argument)
    }

    /// `SYSTEM` with an optional argument, like [`Engine::parse_readings`].
    pub fn parse_system_reading(&mut self, argument: &str) -> AppResult<Option<ReadingsOutcome>> {
        self.parse_records(&SYSTEM_SCHEMA, argument)
    }

    fn parse_records(&mut self, schema: &RecordSchema, argument: &str) -> AppResult<Option<ReadingsOutcome>> {
        let command = if argument.is_empty() {
            Command::query(schema.name)
        } else {
            Command::set(schema.name, argument)
        };
        let frame = self.send_command(&command)?;
        match ReadingsOutcome::from_frame(&frame, schema) {
            Ok(outcome) => {
                match &outcome {
                    ReadingsOutcome::Rejected => report!("{} refused", command.to_wire().escape_default()),
                    ReadingsOutcome::Empty => report!("{} is empty", schema.name),
                    ReadingsOutcome::Entries(records) => {
                        report!("{} holds {} entries", schema.name, records.len());
                        for record in records {
                            debug!(?record, "{} entry", schema.name);
                        }
                    }
                }
                Ok(Some(outcome))
            }
            Err(HarnessError::Protocol(reason)) => {
                error!(command = %command, reply = frame.raw(), %reason, "Undecodable reply");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Expects `READINGS` to be accepted, empty or not.
    pub fn readings_accepted(&mut self, argument: &str) -> AppResult<bool> {
        let outcome = self.parse_readings(argument)?;
        Ok(expect_accepted(READINGS_SCHEMA.name, argument, outcome))
    }

    /// Expects `SYSTEM` to be accepted, empty or not.
    pub fn system_accepted(&mut self, argument: &str) -> AppResult<bool> {
        let outcome = self.parse_system_reading(argument)?;
        Ok(expect_accepted(SYSTEM_SCHEMA.name, argument, outcome))
    }

    /// Reads the first sample's pressure, temperature and humidity.
    ///
    /// A sample missing one of them is a discrepancy.
    pub fn read_sensor_triple(&mut self) -> AppResult<Option<SensorTriple>> {
        let Some(outcome) = self.parse_readings("")? else {
            return Ok(None);
        };
        let Some(record) = outcome.records().first() else {
            error!("No reading available");
            return Ok(None);
        };
        match (record.float('P'), record.float('T'), record.float('H')) {
            (Some(pressure), Some(temperature), Some(humidity)) => {
                let triple = SensorTriple {
                    pressure,
                    temperature,
                    humidity,
                };
                report!("P {:.2}, T {:.2}, H {:.2}", pressure, temperature, humidity);
                Ok(Some(triple))
            }
            _ => {
                error!(?record, "Reading lacks pressure, temperature or humidity");
                Ok(None)
            }
        }
    }

    /// Sends each string and classifies the reply.
    ///
    /// With `expect_wanted` every reply must be wanted; otherwise every reply
    /// must be unwanted. All strings are sent regardless of earlier results.
    pub fn check_commands(&mut self, commands: &[&str], expect_wanted: bool) -> AppResult<bool> {
        let mut passed = true;
        for command in commands {
            report!("--> {}", command.escape_default());
            let frame = self.exchange(command)?;
            report!("<-- {}", frame.raw().escape_default());
            let unwanted = classify(&frame);
            match (expect_wanted, unwanted) {
                (true, Some(reason)) => {
                    error!(command, ?reason, reply = frame.raw(), "Unwanted response");
                    passed = false;
                }
                (false, None) => {
                    error!(command, reply = frame.raw(), "Malformed input was not rejected");
                    passed = false;
                }
                _ => {}
            }
        }
        Ok(passed)
    }

    /// Sets all three offsets, each verified by read-back.
    pub fn set_offsets(&mut self, pressure: f64, temperature: f64, humidity: f64) -> AppResult<bool> {
        debug!(pressure, temperature, humidity, "Setting offsets");
        let p = self.test("PRESSURE_OFFSET", &[&pressure.to_string()], &[])?;
        let t = self.test("TEMP_OFFSET", &[&temperature.to_string()], &[])?;
        let h = self.test("HUMIDITY_OFFSET", &[&humidity.to_string()], &[])?;
        Ok(p && t && h)
    }

    /// Clears SSID and PASS and switches authentication off.
    pub fn clear_wifi_parameters(&mut self) -> AppResult<bool> {
        self.set_wifi_parameters(NULL_ARGUMENT, "NONE", NULL_ARGUMENT)
    }

    /// Logs a warning when `passed` is false, for steps whose outcome is informative only.
    pub fn note(&self, what: &str, passed: bool) {
        if !passed {
            warn!(step = what, "Step did not confirm");
        }
    }
}

fn expect_accepted(name: &str, argument: &str, outcome: Option<ReadingsOutcome>) -> bool {
    match outcome {
        Some(outcome) if outcome.is_accepted() => true,
        Some(_) => {
            error!(command = name, argument = %argument.escape_default(), "Valid argument was refused");
            false
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::simulated::{Quirk, Reachable, SimulatedDevice};
    use std::collections::VecDeque;

    /// Answers each exchange with the next canned reply.
    struct Scripted {
        replies: VecDeque<&'static str>,
    }

    impl Scripted {
        fn new(replies: &[&'static str]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&mut self, _text: &str) -> AppResult<()> {
            Ok(())
        }

        fn receive_timeout(&mut self, _timeout: Duration) -> AppResult<String> {
            Ok(self.replies.pop_front().unwrap_or_default().to_string())
        }

        fn read_timeout(&self) -> Duration {
            Duration::ZERO
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn config() -> HarnessConfig {
        HarnessConfig {
            timing: TimingConfig::immediate(),
            ..HarnessConfig::default()
        }
    }

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(Reachable::from(&config().network))
    }

    #[test]
    fn accepted_and_rejected_ports() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine
            .test("PORT", &["1883", "0", "65535", "8883"], &["", "-5", "65536", "!\")(*&^%;"])
            .unwrap());
    }

    #[test]
    fn lenient_port_is_caught() {
        let config = config();
        let mut device = device().with_quirk(Quirk::LenientPort);
        let mut engine = Engine::new(&mut device, &config);
        assert!(!engine.test("PORT", &["8883"], &["65536"]).unwrap());
    }

    #[test]
    #[tracing_test::traced_test]
    fn stored_invalid_value_is_logged() {
        let config = config();
        let mut device = device().with_quirk(Quirk::LenientPort);
        let mut engine = Engine::new(&mut device, &config);
        assert!(!engine.test("PORT", &[], &["65536"]).unwrap());
        assert!(logs_contain("Invalid value was stored"));
        assert!(logs_contain("PORT"));
    }

    #[test]
    fn action_arguments() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.test("OFFSET_FACTORY", &["RESET"], &["RESE", ""]).unwrap());
        assert!(engine.test("ACQUISITION", &[], &[]).unwrap());
        assert!(!engine.test("ACQUISITION", &["CLEAR"], &[]).unwrap());
    }

    #[test]
    fn read_only_fields() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        for name in ["STATUS", "VERSION", "ID", "SIGNATURE", "MAC"] {
            assert!(engine.protocol_parser(name, false, "", true).unwrap(), "{}", name);
            assert!(engine.protocol_parser(name, true, "something", true).unwrap(), "{}", name);
        }
    }

    #[test]
    fn wrong_signature_is_malformed() {
        let mut config = config();
        config.device.signature = "abcd".to_string();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert!(!engine.protocol_parser("SIGNATURE", false, "", true).unwrap());
    }

    #[test]
    fn silent_device_times_out() {
        let config = config();
        let mut device = device().with_quirk(Quirk::Silent);
        let mut engine = Engine::new(&mut device, &config);
        let err = engine.wait_dev_state_idle().unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn now_with_reference_credentials_connects() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        let network = config.network.clone();
        assert!(engine
            .set_wifi_parameters(&network.ssid, &network.auth, &network.pass)
            .unwrap());
        assert!(engine.test_now().unwrap());
        engine.wait_dev_state_idle().unwrap();
    }

    #[test]
    fn status_path_is_well_formed() {
        let config = config();
        let mut device = Scripted::new(&["STATUS STARTED-CONNECTED-SEND;", "STATUS STARTED-GARBLED;"]);
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.protocol_parser("STATUS", false, "", true).unwrap());
        assert!(!engine.protocol_parser("STATUS", false, "", true).unwrap());
    }

    #[test]
    fn brownout_counts_as_idle() {
        let config = config();
        let mut device = device().after_brownout();
        let mut engine = Engine::new(&mut device, &config);
        engine.wait_dev_state_idle().unwrap();
    }

    #[test]
    fn connection_seen_through_state_paths() {
        let config = config();
        let mut device = Scripted::new(&[
            "DONE;",
            "STATUS STARTED-CONNECTING-CONNECTING_TO_AP;",
            "STATUS STARTED-CONNECTED-SEND;",
            "STATUS BROWNOUT;",
        ]);
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.test_now().unwrap());
    }

    #[test]
    fn now_with_unknown_network_fails() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.set_wifi_parameters("my0penwl4n", "NONE", "NULL").unwrap());
        assert!(!engine.test_now().unwrap());
    }

    #[test]
    fn stuck_connection_is_bounded() {
        let config = config();
        let mut device = device().with_quirk(Quirk::StuckConnecting);
        let mut engine = Engine::new(&mut device, &config);
        assert!(!engine.test_now().unwrap());
    }

    #[test]
    fn readings_decode() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert_eq!(engine.parse_readings("CLEAR").unwrap(), Some(ReadingsOutcome::Empty));
        assert!(engine.test("ACQUISITION", &[], &[]).unwrap());
        let triple = engine.read_sensor_triple().unwrap().unwrap();
        assert!(triple.temperature > 0.0);
        assert_eq!(engine.parse_readings("app.wolkabout.com").unwrap(), Some(ReadingsOutcome::Rejected));
    }

    #[test]
    fn movement_sample_ends_the_wait() {
        let config = config();
        let mut device = device().with_movement_delay(2);
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.test("ATMO", &["OFF"], &[]).unwrap());
        assert!(engine.test("MOVEMENT", &["ON"], &[]).unwrap());
        assert!(engine.wait_for_movement(Duration::from_secs(2)).unwrap());

        let mut device = Scripted::new(&["READINGS R:1514824768,M:x;"]);
        let mut engine = Engine::new(&mut device, &config);
        assert!(!engine.wait_for_movement(Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn command_batches_are_classified() {
        let config = config();
        let mut device = device();
        let mut engine = Engine::new(&mut device, &config);
        assert!(engine.check_commands(&["VERSION;ID;STATUS;"], true).unwrap());
        assert!(engine.check_commands(&["PORT;;", "PORT1;", "qPORT;"], false).unwrap());
        assert!(!engine.check_commands(&["VERSION;"], false).unwrap());
    }
}
