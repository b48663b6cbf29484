//! In-memory WolkSensor.
//!
//! [`SimulatedDevice`] answers the text protocol the way the firmware does as
//! seen from the serial line:
//!
//! - per-parameter argument validation with `BAD_REQUEST;`
//! - `DONE;` for actions and `BUSY;` for writes while a connection attempt is in flight
//! - status progression after `NOW;` and `RELOAD;`, one `STATUS` event per receive
//! - a bounded readings ring with oldest-entry eviction
//! - a factory offset baseline latched by the first write of each offset
//! - movement events once the device has been "moved"
//!
//! Time only advances through the protocol. A movement fires after a set
//! number of receives spent waiting for it (a passive receive, or one
//! following a bare `READINGS;` poll), which stands in for the operator
//! moving the device.

use crate::config::NetworkConfig;
use crate::error::AppResult;
use crate::protocol::command::{ARGUMENT_SEPARATOR, NULL_ARGUMENT, TERMINATOR};
use crate::protocol::response::{DeviceStatus, BAD_REQUEST, BUSY, DONE};
use crate::transport::{echo, Direction, Transport};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Reported by `VERSION;`.
pub const FIRMWARE_VERSION: &str = "4.3.6";
/// Readings ring size of the real device.
pub const DEFAULT_CAPACITY: usize = 180;
/// Receives spent waiting before a movement fires, by default.
pub const DEFAULT_MOVEMENT_DELAY: u32 = 3;

const SSID_MAX: usize = 32;
const PASS_MAX: usize = 63;
const WEP_KEY_LEN: usize = 26;
const HOST_MAX: usize = 64;
const HEARTBEATS: [u32; 5] = [0, 5, 10, 30, 60];
const CONNECT_FAILURE_CODE: &str = "3A1";
const BATTERY_MV: u32 = 2980;

/// Offset channels with their accepted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Pressure,
    Temperature,
    Humidity,
}

impl Channel {
    fn from_command(name: &str) -> Option<Self> {
        match name {
            "PRESSURE_OFFSET" => Some(Channel::Pressure),
            "TEMP_OFFSET" => Some(Channel::Temperature),
            "HUMIDITY_OFFSET" => Some(Channel::Humidity),
            _ => None,
        }
    }

    fn range(self) -> (f64, f64) {
        match self {
            Channel::Pressure => (-100.0, 100.0),
            Channel::Temperature => (-20.0, 37.0),
            Channel::Humidity => (-30.0, 30.0),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Misbehaviours for exercising the harness's failure paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Stores any numeric PORT, even out of range.
    LenientPort,
    /// Never answers.
    Silent,
    /// Reports CONNECTING_TO_AP forever.
    StuckConnecting,
    /// The readings buffer never evicts.
    UnboundedReadings,
    /// Offsets are stored and read back but never applied to readings.
    IgnoreOffsets,
    /// `OFFSET_FACTORY RESET` is acknowledged and changes nothing.
    ResetKeepsOffsets,
}

#[derive(Debug, Clone)]
enum Event {
    Status(DeviceStatus),
    Acquire,
    System(String),
}

#[derive(Debug, Clone)]
struct Settings {
    ssid: String,
    pass: String,
    auth: String,
    url: String,
    hostname: String,
    port: u16,
    heartbeat: u32,
    movement: bool,
    atmo: bool,
    static_ip: String,
    static_mask: String,
    static_gateway: String,
    static_dns: String,
    offsets: [f64; 3],
    factory: [Option<f64>; 3],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            pass: String::new(),
            auth: "NONE".to_string(),
            url: "52.213.16.227".to_string(),
            hostname: "api-demo.wolkabout.com".to_string(),
            port: 8883,
            heartbeat: 5,
            movement: false,
            atmo: true,
            static_ip: "OFF".to_string(),
            static_mask: "0.0.0.0".to_string(),
            static_gateway: "0.0.0.0".to_string(),
            static_dns: "0.0.0.0".to_string(),
            offsets: [0.0; 3],
            factory: [None; 3],
        }
    }
}

/// Credentials of the access point the simulated device can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachable {
    /// Network name
    pub ssid: String,
    /// Authentication mode
    pub auth: String,
    /// Passphrase or key
    pub pass: String,
}

impl From<&NetworkConfig> for Reachable {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            ssid: network.ssid.clone(),
            auth: network.auth.clone(),
            pass: network.pass.clone(),
        }
    }
}

/// A WolkSensor that lives in memory.
pub struct SimulatedDevice {
    settings: Settings,
    reachable: Reachable,
    id: String,
    mac: String,
    signature: String,
    rtc_base: u32,
    rtc_set_at: Instant,
    readings: VecDeque<String>,
    system: VecDeque<String>,
    capacity: usize,
    state: DeviceStatus,
    outbox: Vec<String>,
    events: VecDeque<Event>,
    movement_delay: u32,
    movement_countdown: Option<u32>,
    waiting: bool,
    samples: u64,
    quirks: Vec<Quirk>,
    echo: bool,
}

impl SimulatedDevice {
    /// A conforming device in `IDLE` that can join `reachable`.
    pub fn new(reachable: Reachable) -> Self {
        Self {
            settings: Settings::default(),
            reachable,
            id: "0116WS1000000042".to_string(),
            mac: "0CB2B7A1C3D4".to_string(),
            signature: "****".to_string(),
            rtc_base: 1_514_824_768,
            rtc_set_at: Instant::now(),
            readings: VecDeque::new(),
            system: VecDeque::new(),
            capacity: DEFAULT_CAPACITY,
            state: DeviceStatus::Idle,
            outbox: Vec::new(),
            events: VecDeque::new(),
            movement_delay: DEFAULT_MOVEMENT_DELAY,
            movement_countdown: None,
            waiting: false,
            samples: 0,
            quirks: Vec::new(),
            echo: false,
        }
    }

    /// Readings buffer size, in entries.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Receives spent waiting before a movement event fires.
    pub fn with_movement_delay(mut self, receives: u32) -> Self {
        self.movement_delay = receives.max(1);
        self
    }

    /// Starts in `BROWNOUT`, as after a supply dip.
    pub fn after_brownout(mut self) -> Self {
        self.state = DeviceStatus::Brownout;
        self
    }

    /// Adds a misbehaviour; quirks combine.
    pub fn with_quirk(mut self, quirk: Quirk) -> Self {
        self.quirks.push(quirk);
        self
    }

    /// Logs every exchange at debug instead of trace.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Entries currently held in the readings buffer.
    pub fn readings_len(&self) -> usize {
        self.readings.len()
    }

    /// State as of the last delivered status line.
    pub fn status(&self) -> &DeviceStatus {
        &self.state
    }

    /// Stored SSID, empty when cleared.
    pub fn ssid(&self) -> &str {
        &self.settings.ssid
    }

    fn has(&self, quirk: Quirk) -> bool {
        self.quirks.contains(&quirk)
    }

    fn busy(&self) -> bool {
        !self.events.is_empty() || self.has(Quirk::StuckConnecting)
    }

    fn rtc(&self) -> u64 {
        let elapsed = self.rtc_set_at.elapsed().as_secs();
        (u64::from(self.rtc_base) + elapsed).min(u64::from(u32::MAX))
    }

    fn acquire(&mut self) {
        if !self.settings.atmo {
            return;
        }
        self.samples += 1;
        let jitter = (self.samples % 5) as f64 * 0.01;
        let [p, t, h] = if self.has(Quirk::IgnoreOffsets) {
            [0.0; 3]
        } else {
            self.settings.offsets
        };
        let entry = format!(
            "R:{},T:{:.2},P:{:.2},H:{:.2}",
            self.rtc(),
            22.5 + t + jitter,
            1001.2 + p + jitter,
            40.0 + h + jitter
        );
        self.push_reading(entry);
    }

    fn push_reading(&mut self, entry: String) {
        if self.readings.len() >= self.capacity && !self.has(Quirk::UnboundedReadings) {
            self.readings.pop_front();
        }
        self.readings.push_back(entry);
    }

    fn start_connection(&mut self) {
        let s = &self.settings;
        let reachable = !s.ssid.is_empty()
            && s.ssid == self.reachable.ssid
            && s.auth == self.reachable.auth
            && s.pass == self.reachable.pass;
        let rtc = self.rtc();

        self.events.push_back(Event::Status(DeviceStatus::ConnectingToAp));
        if reachable {
            self.events.push_back(Event::Status(DeviceStatus::AcquiringIpAddress));
            self.events.push_back(Event::Status(DeviceStatus::ConnectingToServer));
            self.events.push_back(Event::System(format!(
                "R:{},A:2,D:1,S:1,Q:1,L:0,C:5,B:{},V:{}",
                rtc, BATTERY_MV, FIRMWARE_VERSION
            )));
            self.events.push_back(Event::Status(DeviceStatus::Idle));
        } else {
            self.events.push_back(Event::System(format!(
                "R:{},E:{},A:10,B:{},V:{}",
                rtc, CONNECT_FAILURE_CODE, BATTERY_MV, FIRMWARE_VERSION
            )));
            self.events
                .push_back(Event::Status(DeviceStatus::Error(CONNECT_FAILURE_CODE.to_string())));
        }
    }

    /// Applies queued events up to and including the next visible status.
    fn next_event(&mut self) -> Option<String> {
        while let Some(event) = self.events.pop_front() {
            match event {
                Event::Acquire => self.acquire(),
                Event::System(entry) => {
                    if self.system.len() >= self.capacity {
                        self.system.pop_front();
                    }
                    self.system.push_back(entry);
                }
                Event::Status(status) => {
                    let line = format!("STATUS {}{}", status.as_wire(), TERMINATOR);
                    self.state = match status {
                        DeviceStatus::Error(_) => DeviceStatus::Idle,
                        other => other,
                    };
                    return Some(line);
                }
            }
        }
        None
    }

    fn tick_movement(&mut self) {
        let Some(remaining) = self.movement_countdown else {
            return;
        };
        if remaining > 1 {
            self.movement_countdown = Some(remaining - 1);
            return;
        }
        self.movement_countdown = None;
        let entry = format!("R:{},M:1.00", self.rtc());
        self.push_reading(entry);
        if !self.settings.ssid.is_empty() && self.events.is_empty() {
            self.start_connection();
        }
    }

    fn handle(&mut self, command: &str) -> String {
        let (name, argument) = match command.split_once(ARGUMENT_SEPARATOR) {
            Some((name, argument)) => (name, Some(argument)),
            None => (command, None),
        };

        let is_write = argument.is_some() || matches!(name, "NOW" | "RELOAD");
        if is_write && self.busy() && is_known(name) {
            return format!("{}{}", BUSY, TERMINATOR);
        }

        let response = match (name, argument) {
            ("SSID", arg) => self.text_setting(arg, SSID_MAX, |s| &mut s.ssid).map(|v| reply("SSID", &v)),
            ("PASS", arg) => self.pass(arg),
            ("AUTH", Some(arg)) => matches!(arg, "NONE" | "WEP" | "WPA" | "WPA2").then(|| {
                self.settings.auth = arg.to_string();
                reply("AUTH", arg)
            }),
            ("AUTH", None) => Some(reply("AUTH", &self.settings.auth)),
            ("URL", arg) => self.host_setting(arg, |s| &mut s.url).map(|v| reply("URL", &v)),
            ("HOSTNAME", arg) => self.host_setting(arg, |s| &mut s.hostname).map(|v| reply("HOSTNAME", &v)),
            ("PORT", Some(arg)) => self.port(arg),
            ("PORT", None) => Some(reply("PORT", &self.settings.port.to_string())),
            ("HEARTBEAT", Some(arg)) => parse_digits(arg)
                .filter(|v| HEARTBEATS.iter().any(|h| u64::from(*h) == *v))
                .map(|v| {
                    self.settings.heartbeat = v as u32;
                    reply("HEARTBEAT", arg)
                }),
            ("HEARTBEAT", None) => Some(reply("HEARTBEAT", &self.settings.heartbeat.to_string())),
            ("MOVEMENT", arg) => self.switch(arg, true).map(|on| reply("MOVEMENT", on_off(on))),
            ("ATMO", arg) => self.switch(arg, false).map(|on| reply("ATMO", on_off(on))),
            ("RTC", Some(arg)) => parse_digits(arg)
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| {
                    self.rtc_base = v;
                    self.rtc_set_at = Instant::now();
                    reply("RTC", &v.to_string())
                }),
            ("RTC", None) => Some(reply("RTC", &self.rtc().to_string())),
            ("STATIC_IP", arg) => self.address(arg, true, |s| &mut s.static_ip).map(|v| reply("STATIC_IP", &v)),
            ("STATIC_MASK", arg) => self.address(arg, false, |s| &mut s.static_mask).map(|v| reply("STATIC_MASK", &v)),
            ("STATIC_GATEWAY", arg) => {
                self.address(arg, false, |s| &mut s.static_gateway).map(|v| reply("STATIC_GATEWAY", &v))
            }
            ("STATIC_DNS", arg) => self.address(arg, false, |s| &mut s.static_dns).map(|v| reply("STATIC_DNS", &v)),
            (offset, arg) if Channel::from_command(offset).is_some() => Channel::from_command(offset)
                .and_then(|channel| self.offset(channel, arg))
                .map(|v| reply(offset, &format_offset(v))),
            ("OFFSET_FACTORY", None) => {
                let [p, t, h] = self.factory();
                Some(reply(
                    "OFFSET_FACTORY",
                    &format!("P:{},T:{},H:{}", format_offset(p), format_offset(t), format_offset(h)),
                ))
            }
            ("OFFSET_FACTORY", Some("RESET")) => {
                if !self.has(Quirk::ResetKeepsOffsets) {
                    self.settings.offsets = self.factory();
                }
                Some(reply("OFFSET_FACTORY", "RESET"))
            }
            ("ACQUISITION", None) => {
                self.acquire();
                Some(word(DONE))
            }
            ("NOW", None) => {
                self.start_connection();
                Some(word(DONE))
            }
            ("RELOAD", None) => {
                self.events.push_back(Event::Status(DeviceStatus::Acquisition));
                self.events.push_back(Event::Acquire);
                self.events.push_back(Event::Status(DeviceStatus::Idle));
                Some(word(DONE))
            }
            ("READINGS", arg) => {
                if arg.is_none() {
                    self.waiting = true;
                }
                records(arg, "READINGS", &mut self.readings)
            }
            ("SYSTEM", arg) => records(arg, "SYSTEM", &mut self.system),
            ("STATUS", None) => {
                let state = if self.has(Quirk::StuckConnecting) {
                    DeviceStatus::ConnectingToAp
                } else {
                    self.state.clone()
                };
                Some(reply("STATUS", &state_path(&state)))
            }
            ("VERSION", None) => Some(reply("VERSION", FIRMWARE_VERSION)),
            ("ID", None) => Some(reply("ID", &self.id)),
            ("SIGNATURE", None) => Some(reply("SIGNATURE", &self.signature)),
            ("MAC", None) => Some(reply("MAC", &self.mac)),
            _ => None,
        };

        response.unwrap_or_else(|| word(BAD_REQUEST))
    }

    fn text_setting(
        &mut self,
        argument: Option<&str>,
        max_len: usize,
        field: impl Fn(&mut Settings) -> &mut String,
    ) -> Option<String> {
        let slot = field(&mut self.settings);
        match argument {
            None => Some(slot.clone()),
            Some(NULL_ARGUMENT) => {
                slot.clear();
                Some(String::new())
            }
            Some(arg) if arg.chars().count() <= max_len => {
                *slot = arg.to_string();
                Some(slot.clone())
            }
            Some(_) => None,
        }
    }

    fn pass(&mut self, argument: Option<&str>) -> Option<String> {
        let wep_key_ok = |arg: &str| arg.len() == WEP_KEY_LEN && arg.chars().all(|c| c.is_ascii_hexdigit());
        match argument {
            Some(arg) if arg != NULL_ARGUMENT && self.settings.auth == "WEP" && !wep_key_ok(arg) => None,
            arg => self.text_setting(arg, PASS_MAX, |s| &mut s.pass).map(|v| reply("PASS", &v)),
        }
    }

    fn host_setting(
        &mut self,
        argument: Option<&str>,
        field: impl Fn(&mut Settings) -> &mut String,
    ) -> Option<String> {
        let slot = field(&mut self.settings);
        match argument {
            None => Some(slot.clone()),
            Some(arg) if valid_host(arg) => {
                *slot = arg.to_string();
                Some(slot.clone())
            }
            Some(_) => None,
        }
    }

    fn address(
        &mut self,
        argument: Option<&str>,
        allow_off: bool,
        field: impl Fn(&mut Settings) -> &mut String,
    ) -> Option<String> {
        let slot = field(&mut self.settings);
        match argument {
            None => Some(slot.clone()),
            Some("OFF") if allow_off => {
                *slot = "OFF".to_string();
                Some(slot.clone())
            }
            Some(arg) => arg.parse::<Ipv4Addr>().ok().map(|ip| {
                *slot = ip.to_string();
                slot.clone()
            }),
        }
    }

    fn port(&mut self, argument: &str) -> Option<String> {
        let value = parse_digits(argument)?;
        let port = if self.has(Quirk::LenientPort) {
            value as u16
        } else {
            u16::try_from(value).ok()?
        };
        self.settings.port = port;
        Some(reply("PORT", &port.to_string()))
    }

    fn switch(&mut self, argument: Option<&str>, movement: bool) -> Option<bool> {
        let value = match argument {
            None => None,
            Some("ON") => Some(true),
            Some("OFF") => Some(false),
            Some(_) => return None,
        };
        if let Some(on) = value {
            if movement {
                self.settings.movement = on;
                self.movement_countdown = on.then_some(self.movement_delay);
            } else {
                self.settings.atmo = on;
            }
        }
        Some(if movement { self.settings.movement } else { self.settings.atmo })
    }

    fn offset(&mut self, channel: Channel, argument: Option<&str>) -> Option<f64> {
        let i = channel.index();
        let Some(arg) = argument else {
            return Some(self.settings.offsets[i]);
        };
        let (low, high) = channel.range();
        let value = arg
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (low..=high).contains(v))?;
        if self.settings.factory[i].is_none() {
            self.settings.factory[i] = Some(value);
        }
        self.settings.offsets[i] = value;
        Some(value)
    }

    fn factory(&self) -> [f64; 3] {
        self.settings.factory.map(|v| v.unwrap_or(0.0))
    }
}

impl Transport for SimulatedDevice {
    fn send(&mut self, text: &str) -> AppResult<()> {
        echo(self.echo, "simulated", Direction::Sent, text);
        if self.has(Quirk::Silent) {
            return Ok(());
        }
        // an unterminated tail stays unprocessed, as on the device
        let mut commands: Vec<&str> = text.split(TERMINATOR).collect();
        commands.pop();
        for command in commands {
            let reply = self.handle(command);
            self.outbox.push(reply);
        }
        Ok(())
    }

    fn receive_timeout(&mut self, _timeout: Duration) -> AppResult<String> {
        if self.outbox.is_empty() || self.waiting {
            self.tick_movement();
        }
        self.waiting = false;

        let mut response: String = self.outbox.drain(..).collect();
        if let Some(event) = self.next_event() {
            response.push_str(&event);
        }
        echo(self.echo, "simulated", Direction::Received, &response);
        Ok(response)
    }

    fn read_timeout(&self) -> Duration {
        Duration::ZERO
    }

    fn describe(&self) -> String {
        "simulated WolkSensor".to_string()
    }
}

/// A queried status names the whole state path, parents first.
fn state_path(state: &DeviceStatus) -> String {
    match state {
        DeviceStatus::ConnectingToAp | DeviceStatus::AcquiringIpAddress => {
            format!("STARTED-CONNECTING-{}", state.as_wire())
        }
        DeviceStatus::ConnectingToServer => "STARTED-CONNECTED-SEND".to_string(),
        DeviceStatus::Disconnecting => "STARTED-DISCONNECTING".to_string(),
        other => other.as_wire(),
    }
}

fn is_known(name: &str) -> bool {
    crate::protocol::Parameter::lookup(name).is_some()
}

fn reply(name: &str, value: &str) -> String {
    if value.is_empty() {
        format!("{}{}", name, TERMINATOR)
    } else {
        format!("{}{}{}{}", name, ARGUMENT_SEPARATOR, value, TERMINATOR)
    }
}

fn word(word: &str) -> String {
    format!("{}{}", word, TERMINATOR)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

fn records(argument: Option<&str>, name: &str, buffer: &mut VecDeque<String>) -> Option<String> {
    match argument {
        None => {}
        Some("CLEAR") => buffer.clear(),
        Some(_) => return None,
    }
    let entries: Vec<&str> = buffer.iter().map(String::as_str).collect();
    Some(reply(name, &entries.join("|")))
}

/// Unsigned decimal with no sign or whitespace.
fn parse_digits(text: &str) -> Option<u64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// `%g`-style rendering of an offset.
fn format_offset(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Dotted quad, or a DNS name of at least two labels with no all-numeric label.
fn valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > HOST_MAX {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    let numeric = |label: &&str| !label.is_empty() && label.chars().all(|c| c.is_ascii_digit());
    if labels.iter().all(numeric) {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    labels.len() >= 2
        && labels.iter().all(|label| {
            (1..=63).contains(&label.len())
                && !label.starts_with('-')
                && !label.ends_with('-')
                && !numeric(label)
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(Reachable {
            ssid: "wolkabout".into(),
            auth: "WPA2".into(),
            pass: "Walkm3int0".into(),
        })
    }

    fn exchange(device: &mut SimulatedDevice, text: &str) -> String {
        device.send(text).unwrap();
        device.receive().unwrap()
    }

    #[test]
    fn answers_queries_and_sets() {
        let mut d = device();
        assert_eq!(exchange(&mut d, "PORT 1883;"), "PORT 1883;");
        assert_eq!(exchange(&mut d, "PORT;"), "PORT 1883;");
        assert_eq!(exchange(&mut d, "PORT 65536;"), "BAD_REQUEST;");
        assert_eq!(exchange(&mut d, "SSID NULL;"), "SSID;");
        assert_eq!(exchange(&mut d, "VERSION;"), "VERSION 4.3.6;");
    }

    #[test]
    fn malformed_commands_are_bad_requests() {
        let mut d = device();
        assert_eq!(exchange(&mut d, "PORT1;"), "BAD_REQUEST;");
        assert_eq!(exchange(&mut d, "PORT;;"), "PORT 8883;BAD_REQUEST;");
        assert_eq!(exchange(&mut d, "STATUS change status;"), "BAD_REQUEST;");
        assert_eq!(exchange(&mut d, "ACQUISITION CLEAR;"), "BAD_REQUEST;");
    }

    #[test]
    fn unterminated_tail_is_ignored() {
        let mut d = device();
        assert_eq!(exchange(&mut d, "ID;OFFSET_FACTORY"), "ID 0116WS1000000042;");
    }

    #[test]
    fn hosts_follow_dns_rules() {
        for good in ["8.8.8.8", "9gag.com", "app-wolksense.com", "api-demo.wolkabout.com"] {
            assert!(valid_host(good), "{}", good);
        }
        for bad in ["", "256.256.256.256", "appwolksense", "-app.wolksense", "9gag.123.com", "app.wolksense*com"] {
            assert!(!valid_host(bad), "{}", bad);
        }
    }

    #[test]
    fn wep_requires_hex_key() {
        let mut d = device();
        exchange(&mut d, "AUTH WEP;");
        assert_eq!(exchange(&mut d, "PASS mypassword;"), "BAD_REQUEST;");
        assert_eq!(
            exchange(&mut d, "PASS 008C7073C348F91054E1FB8729;"),
            "PASS 008C7073C348F91054E1FB8729;"
        );
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut d = device().with_capacity(3);
        for _ in 0..5 {
            assert_eq!(exchange(&mut d, "ACQUISITION;"), "DONE;");
        }
        assert_eq!(d.readings_len(), 3);
        assert_eq!(exchange(&mut d, "READINGS CLEAR;"), "READINGS;");
        assert_eq!(d.readings_len(), 0);
    }

    #[test]
    fn atmo_off_suppresses_samples() {
        let mut d = device();
        exchange(&mut d, "ATMO OFF;");
        exchange(&mut d, "ACQUISITION;");
        assert_eq!(exchange(&mut d, "READINGS;"), "READINGS;");
    }

    #[test]
    fn connection_progresses_one_status_per_receive() {
        let mut d = device();
        exchange(&mut d, "SSID wolkabout;AUTH WPA2;PASS Walkm3int0;");
        assert_eq!(exchange(&mut d, "NOW;"), "DONE;STATUS CONNECTING_TO_AP;");
        assert_eq!(exchange(&mut d, "PORT 1;"), "BUSY;STATUS ACQUIRING_IP_ADDRESS;");
        assert_eq!(d.receive().unwrap(), "STATUS CONNECTING_TO_SERVER;");
        assert_eq!(d.receive().unwrap(), "STATUS IDLE;");
        assert_eq!(exchange(&mut d, "STATUS;"), "STATUS IDLE;");
        assert!(exchange(&mut d, "SYSTEM;").starts_with("SYSTEM R:"));
    }

    #[test]
    fn queried_status_names_the_state_path() {
        let mut d = device();
        exchange(&mut d, "SSID wolkabout;AUTH WPA2;PASS Walkm3int0;");
        assert_eq!(exchange(&mut d, "NOW;"), "DONE;STATUS CONNECTING_TO_AP;");
        assert_eq!(
            exchange(&mut d, "STATUS;"),
            "STATUS STARTED-CONNECTING-CONNECTING_TO_AP;STATUS ACQUIRING_IP_ADDRESS;"
        );
        assert_eq!(
            exchange(&mut d, "STATUS;"),
            "STATUS STARTED-CONNECTING-ACQUIRING_IP_ADDRESS;STATUS CONNECTING_TO_SERVER;"
        );
        assert_eq!(exchange(&mut d, "STATUS;"), "STATUS STARTED-CONNECTED-SEND;STATUS IDLE;");
        assert_eq!(exchange(&mut d, "STATUS;"), "STATUS IDLE;");
    }

    #[test]
    fn brownout_is_reported_until_the_next_change() {
        let mut d = device().after_brownout();
        assert_eq!(exchange(&mut d, "STATUS;"), "STATUS BROWNOUT;");
        assert_eq!(exchange(&mut d, "PORT 1883;"), "PORT 1883;");
    }

    #[test]
    fn unknown_network_reports_error() {
        let mut d = device();
        exchange(&mut d, "SSID my0penwl4n;");
        assert_eq!(exchange(&mut d, "NOW;"), "DONE;STATUS CONNECTING_TO_AP;");
        assert_eq!(d.receive().unwrap(), "STATUS ERROR:3A1;");
        assert_eq!(exchange(&mut d, "STATUS;"), "STATUS IDLE;");
    }

    #[test]
    fn factory_offsets_latch_first_write() {
        let mut d = device();
        exchange(&mut d, "TEMP_OFFSET 1.5;");
        exchange(&mut d, "TEMP_OFFSET -2;");
        assert_eq!(exchange(&mut d, "OFFSET_FACTORY;"), "OFFSET_FACTORY P:0,T:1.5,H:0;");
        assert_eq!(exchange(&mut d, "OFFSET_FACTORY RESET;"), "OFFSET_FACTORY RESET;");
        assert_eq!(exchange(&mut d, "TEMP_OFFSET;"), "TEMP_OFFSET 1.5;");
        assert_eq!(exchange(&mut d, "TEMP_OFFSET 38;"), "BAD_REQUEST;");
    }

    #[test]
    fn offset_quirks() {
        let mut d = device().with_quirk(Quirk::IgnoreOffsets);
        exchange(&mut d, "READINGS CLEAR;");
        exchange(&mut d, "TEMP_OFFSET 10;");
        assert_eq!(exchange(&mut d, "TEMP_OFFSET;"), "TEMP_OFFSET 10;");
        exchange(&mut d, "ACQUISITION;");
        assert!(exchange(&mut d, "READINGS;").contains(",T:22.5"));

        let mut d = device().with_quirk(Quirk::ResetKeepsOffsets);
        exchange(&mut d, "TEMP_OFFSET 0;");
        exchange(&mut d, "TEMP_OFFSET -2;");
        assert_eq!(exchange(&mut d, "OFFSET_FACTORY RESET;"), "OFFSET_FACTORY RESET;");
        assert_eq!(exchange(&mut d, "TEMP_OFFSET;"), "TEMP_OFFSET -2;");
    }

    #[test]
    fn movement_fires_while_waiting() {
        let mut d = device().with_movement_delay(2);
        exchange(&mut d, "ATMO OFF;");
        exchange(&mut d, "MOVEMENT ON;");
        assert_eq!(exchange(&mut d, "READINGS;"), "READINGS;");
        assert_eq!(exchange(&mut d, "READINGS;"), "READINGS;");
        assert!(exchange(&mut d, "READINGS;").ends_with(",M:1.00;"));
    }

    #[test]
    fn movement_with_ssid_starts_connection() {
        let mut d = device().with_movement_delay(1);
        exchange(&mut d, "SSID wolkabout;");
        exchange(&mut d, "MOVEMENT ON;");
        assert_eq!(d.receive().unwrap(), "STATUS CONNECTING_TO_AP;");
    }

    #[test]
    fn rtc_rejects_signs_and_overflow() {
        let mut d = device();
        assert_eq!(exchange(&mut d, "RTC 4294967295;"), "RTC 4294967295;");
        assert_eq!(exchange(&mut d, "RTC -1;"), "BAD_REQUEST;");
        assert_eq!(exchange(&mut d, "RTC 4294967296;"), "BAD_REQUEST;");
    }
}
