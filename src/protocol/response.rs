//! Schema-driven decoding of device replies.
//!
//! A reply is a run of `;`-terminated tokens, each `NAME` or `NAME payload`.
//! Record-carrying replies (`READINGS`, `SYSTEM`) hold `|`-separated records of
//! `K:v` fields; the key-to-type map for each lives in a [`RecordSchema`].

use crate::error::{AppResult, HarnessError};
use crate::protocol::command::{ARGUMENT_SEPARATOR, TERMINATOR};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Matches one `K:value` field inside a record payload.
static FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s,|])([A-Z]):([^,|;\s]*)").expect("Invalid record field regex")
});

/// Acknowledges an action.
pub const DONE: &str = "DONE";
/// Write refused while a connection attempt is in flight.
pub const BUSY: &str = "BUSY";
/// Unknown command or invalid argument.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// Generic acknowledgement.
pub const OK: &str = "OK";
/// Prefix of a failed status.
pub const ERROR: &str = "ERROR";

/// One `;`-terminated token of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Parameter or status word.
    pub name: String,
    /// Text after the first space, if any.
    pub payload: Option<String>,
}

impl Token {
    fn parse(text: &str) -> Self {
        match text.split_once(ARGUMENT_SEPARATOR) {
            Some((name, payload)) => Self {
                name: name.trim_start().to_string(),
                payload: Some(payload.to_string()),
            },
            None => Self {
                name: text.trim().to_string(),
                payload: None,
            },
        }
    }

    /// Bare status words carry no payload.
    pub fn is_word(&self, word: &str) -> bool {
        self.payload.is_none() && self.name == word
    }
}

/// Everything received in answer to one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: String,
    tokens: Vec<Token>,
    terminated: bool,
}

impl Frame {
    /// Splits `raw` on terminators. A trailing piece without one is kept as a
    /// last token and the frame is marked unterminated.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let terminated = raw.ends_with(TERMINATOR);
        let mut pieces: Vec<&str> = raw.split(TERMINATOR).collect();
        // split leaves an empty tail after the final terminator
        if terminated || raw.is_empty() {
            pieces.pop();
        }
        Self {
            raw: raw.to_string(),
            tokens: pieces.into_iter().map(Token::parse).collect(),
            terminated,
        }
    }

    /// Received text, trimmed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Tokens in arrival order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Nothing arrived.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether the frame ends on a terminator, i.e. was not cut short.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// First token carrying the given name.
    pub fn token(&self, name: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.name == name)
    }

    /// Payload of the first token with the given name, if it has one.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.token(name).and_then(|t| t.payload.as_deref())
    }

    /// Whether a bare word such as `DONE` is present.
    pub fn has_word(&self, word: &str) -> bool {
        self.tokens.iter().any(|t| t.is_word(word))
    }

    /// All `STATUS` tokens in arrival order.
    pub fn statuses(&self) -> impl Iterator<Item = DeviceStatus> + '_ {
        self.tokens
            .iter()
            .filter(|t| t.name == "STATUS")
            .filter_map(|t| t.payload.as_deref())
            .map(DeviceStatus::parse)
    }
}

/// Leaves of the communication module's state tree other than the ones with
/// their own variant.
const LINK_STATES: &[&str] = &[
    "STOPPED",
    "STARTING",
    "STARTED",
    "DISCONNECTED",
    "CONNECTING",
    "CONNECTED",
    "SEND",
    "SEND_TO",
    "RECEIVE",
    "RECEIVE_FROM",
    "CLOSING_SOCKET",
    "RESET",
    "STOPPING",
];

/// Link states that belong to an attempt in flight.
const LINK_CONNECTING: &[&str] = &[
    "CONNECTING",
    "CONNECTED",
    "SEND",
    "SEND_TO",
    "RECEIVE",
    "RECEIVE_FROM",
    "CLOSING_SOCKET",
];

/// Device state as reported by `STATUS`.
///
/// Unsolicited lines carry a bare name (`STATUS CONNECTING_TO_AP;`). A
/// queried status during a data exchange carries the whole nested state path
/// joined with `-` (`STATUS STARTED-CONNECTING-CONNECTING_TO_AP;`); only its
/// last segment is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Waiting for the next acquisition or command.
    Idle,
    /// Idle after a brownout reset. Commands are served, heartbeats are not.
    Brownout,
    /// Taking a sample.
    Acquisition,
    /// Joining the access point.
    ConnectingToAp,
    /// Waiting for DHCP.
    AcquiringIpAddress,
    /// Opening the TCP session.
    ConnectingToServer,
    /// Leaving the access point.
    Disconnecting,
    /// Any other communication module state, e.g. `SEND` or `STOPPED`.
    Link(String),
    /// `ERROR:` followed by the device's hex error code.
    Error(String),
    /// Anything unrecognised, kept whole.
    Other(String),
}

impl DeviceStatus {
    /// Decodes a `STATUS` payload, bare or `-`-joined.
    pub fn parse(payload: &str) -> Self {
        let payload = payload.trim();
        if let Some(code) = payload.strip_prefix("ERROR:") {
            return DeviceStatus::Error(code.to_string());
        }
        let leaf = payload.rsplit('-').next().unwrap_or(payload);
        match leaf {
            "IDLE" => DeviceStatus::Idle,
            "BROWNOUT" => DeviceStatus::Brownout,
            "ACQUISITION" => DeviceStatus::Acquisition,
            "CONNECTING_TO_AP" => DeviceStatus::ConnectingToAp,
            "ACQUIRING_IP_ADDRESS" => DeviceStatus::AcquiringIpAddress,
            "CONNECTING_TO_SERVER" => DeviceStatus::ConnectingToServer,
            "DISCONNECTING" => DeviceStatus::Disconnecting,
            ERROR => DeviceStatus::Error(String::new()),
            link if LINK_STATES.contains(&link) => DeviceStatus::Link(link.to_string()),
            _ => DeviceStatus::Other(payload.to_string()),
        }
    }

    /// Ready for commands: `IDLE`, or `BROWNOUT` which is idle on low power.
    pub fn is_idle(&self) -> bool {
        matches!(self, DeviceStatus::Idle | DeviceStatus::Brownout)
    }

    /// Any of the states passed through while a connection is in flight.
    pub fn is_connecting(&self) -> bool {
        match self {
            DeviceStatus::ConnectingToAp
            | DeviceStatus::AcquiringIpAddress
            | DeviceStatus::ConnectingToServer => true,
            DeviceStatus::Link(state) => LINK_CONNECTING.contains(&state.as_str()),
            _ => false,
        }
    }

    /// Wire form of the payload as an unsolicited line prints it.
    pub fn as_wire(&self) -> String {
        match self {
            DeviceStatus::Idle => "IDLE".into(),
            DeviceStatus::Brownout => "BROWNOUT".into(),
            DeviceStatus::Acquisition => "ACQUISITION".into(),
            DeviceStatus::ConnectingToAp => "CONNECTING_TO_AP".into(),
            DeviceStatus::AcquiringIpAddress => "ACQUIRING_IP_ADDRESS".into(),
            DeviceStatus::ConnectingToServer => "CONNECTING_TO_SERVER".into(),
            DeviceStatus::Disconnecting => "DISCONNECTING".into(),
            DeviceStatus::Link(state) => state.clone(),
            DeviceStatus::Error(code) => format!("ERROR:{}", code),
            DeviceStatus::Other(text) => text.clone(),
        }
    }
}

/// Type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Seconds since the epoch.
    Timestamp,
    /// Fixed-point decimal such as `23.51`.
    Float,
    /// Signed decimal integer.
    Int,
    /// Hexadecimal error code.
    Hex,
    /// Text taken verbatim.
    String,
}

/// Value types that can be parsed from record fields
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text field
    String(String),
    /// Signed integer
    Int(i64),
    /// Unsigned integer, from hex
    Uint(u64),
    /// Decimal
    Float(f64),
    /// Epoch seconds
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Convert to f64 for numeric operations
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Uint(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Convert to i64 for integer operations
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Uint(u) => i64::try_from(*u).ok(),
            FieldValue::Float(f) => Some(*f as i64),
            FieldValue::Timestamp(t) => Some(t.timestamp()),
            FieldValue::String(_) => None,
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Uint(u) => u.to_string(),
            FieldValue::Float(f) => format!("{:.2}", f),
            FieldValue::Timestamp(t) => t.timestamp().to_string(),
        }
    }
}

/// Key-to-type map for one record-carrying reply.
#[derive(Debug, Clone, Copy)]
pub struct RecordSchema {
    /// Reply token name.
    pub name: &'static str,
    /// Known keys and their types.
    pub fields: &'static [(char, FieldType)],
    /// Type of keys not listed in `fields`.
    pub fallback: FieldType,
}

impl RecordSchema {
    /// Type of `key`, or the fallback.
    pub fn field_type(&self, key: char) -> FieldType {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, t)| *t)
            .unwrap_or(self.fallback)
    }
}

/// Sensor readings: timestamp plus one decimal per sensor.
pub const READINGS_SCHEMA: RecordSchema = RecordSchema {
    name: "READINGS",
    fields: &[
        ('R', FieldType::Timestamp),
        ('T', FieldType::Float),
        ('P', FieldType::Float),
        ('H', FieldType::Float),
        ('M', FieldType::Float),
    ],
    fallback: FieldType::Float,
};

/// System items: timestamp, error code, battery, firmware version and
/// connection phase timers.
pub const SYSTEM_SCHEMA: RecordSchema = RecordSchema {
    name: "SYSTEM",
    fields: &[
        ('R', FieldType::Timestamp),
        ('E', FieldType::Hex),
        ('B', FieldType::Int),
        ('V', FieldType::String),
        ('A', FieldType::Int),
        ('D', FieldType::Int),
        ('S', FieldType::Int),
        ('Q', FieldType::Int),
        ('L', FieldType::Int),
        ('C', FieldType::Int),
    ],
    fallback: FieldType::String,
};

/// One `|`-separated entry of a record reply, fields in wire order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(char, FieldValue)>,
}

impl Record {
    /// Value of the first field with `key`.
    pub fn get(&self, key: char) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Numeric value of `key`.
    pub fn float(&self, key: char) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    /// The `R` field.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.get('R') {
            Some(FieldValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }
}

/// Result of a `READINGS` or `SYSTEM` exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingsOutcome {
    /// The device refused the argument.
    Rejected,
    /// The buffer holds nothing.
    Empty,
    /// Decoded entries, oldest first.
    Entries(Vec<Record>),
}

impl ReadingsOutcome {
    /// Decodes the reply to a record query. A frame without the expected
    /// token and without a rejection is a protocol error.
    pub fn from_frame(frame: &Frame, schema: &RecordSchema) -> AppResult<Self> {
        if frame.has_word(BAD_REQUEST) {
            return Ok(ReadingsOutcome::Rejected);
        }
        let token = frame.token(schema.name).ok_or_else(|| {
            HarnessError::Protocol(format!("no {} token in '{}'", schema.name, frame.raw()))
        })?;
        match token.payload.as_deref().map(str::trim) {
            None | Some("") => Ok(ReadingsOutcome::Empty),
            Some(payload) => Ok(ReadingsOutcome::Entries(parse_records(payload, schema)?)),
        }
    }

    /// Anything but a refusal counts as a successful query.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ReadingsOutcome::Rejected)
    }

    /// Number of entries; zero unless [`ReadingsOutcome::Entries`].
    pub fn len(&self) -> usize {
        match self {
            ReadingsOutcome::Entries(records) => records.len(),
            _ => 0,
        }
    }

    /// Entries, empty unless [`ReadingsOutcome::Entries`].
    pub fn records(&self) -> &[Record] {
        match self {
            ReadingsOutcome::Entries(records) => records,
            _ => &[],
        }
    }
}

/// Parses a `|`-separated record payload against a schema.
pub fn parse_records(payload: &str, schema: &RecordSchema) -> AppResult<Vec<Record>> {
    payload
        .split('|')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| parse_record(entry, schema))
        .collect()
}

fn parse_record(entry: &str, schema: &RecordSchema) -> AppResult<Record> {
    let mut record = Record::default();
    for field in entry.trim().split(',') {
        let (key, raw) = field
            .split_once(':')
            .ok_or_else(|| HarnessError::Protocol(format!("malformed field '{}'", field)))?;
        let mut chars = key.chars();
        let key = match (chars.next(), chars.next()) {
            (Some(k), None) => k,
            _ => return Err(HarnessError::Protocol(format!("malformed field key '{}'", key))),
        };
        record
            .fields
            .push((key, parse_field_value(raw, schema.field_type(key))?));
    }
    Ok(record)
}

fn parse_field_value(raw: &str, field_type: FieldType) -> AppResult<FieldValue> {
    let bad = |what: &str| HarnessError::Protocol(format!("failed to parse {} from '{}'", what, raw));
    match field_type {
        FieldType::String => Ok(FieldValue::String(raw.to_string())),
        FieldType::Int => raw.parse().map(FieldValue::Int).map_err(|_| bad("int")),
        FieldType::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(FieldValue::Float)
            .ok_or_else(|| bad("float")),
        FieldType::Hex => u64::from_str_radix(raw, 16)
            .map(FieldValue::Uint)
            .map_err(|_| bad("hex")),
        FieldType::Timestamp => raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(FieldValue::Timestamp)
            .ok_or_else(|| bad("timestamp")),
    }
}

/// Extracts the first `key:` field of a raw line.
///
/// Returns `Ok(None)` when the device omitted the field and an error when the
/// field is present but does not parse as `field_type`.
pub fn extract_field(line: &str, key: char, field_type: FieldType) -> AppResult<Option<FieldValue>> {
    for captures in FIELD_REGEX.captures_iter(line) {
        let matches_key = captures
            .get(1)
            .and_then(|m| m.as_str().chars().next())
            .is_some_and(|k| k == key);
        if matches_key {
            let raw = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            return parse_field_value(raw, field_type).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_concatenated_tokens() {
        let frame = Frame::parse("SSID wolkabout;STATUS CONNECTING_TO_AP;DONE;");
        assert!(frame.is_terminated());
        assert_eq!(frame.tokens().len(), 3);
        assert_eq!(frame.value("SSID"), Some("wolkabout"));
        assert!(frame.has_word(DONE));
        assert_eq!(frame.statuses().collect::<Vec<_>>(), vec![DeviceStatus::ConnectingToAp]);
    }

    #[test]
    fn truncated_frame_is_flagged() {
        let frame = Frame::parse("READINGS R:1514824768,T:23.5");
        assert!(!frame.is_terminated());
        assert_eq!(frame.tokens().len(), 1);
        assert!(Frame::parse("").tokens().is_empty());
    }

    #[test]
    fn empty_token_between_terminators() {
        let frame = Frame::parse("BAD_REQUEST;;");
        assert_eq!(frame.tokens().len(), 2);
        assert_eq!(frame.tokens()[1].name, "");
    }

    #[test]
    fn status_error_keeps_code() {
        assert_eq!(DeviceStatus::parse("ERROR:31A"), DeviceStatus::Error("31A".into()));
        assert_eq!(DeviceStatus::parse("IDLE"), DeviceStatus::Idle);
        assert!(DeviceStatus::parse("ACQUIRING_IP_ADDRESS").is_connecting());
        assert_eq!(DeviceStatus::Error("7".into()).as_wire(), "ERROR:7");
    }

    #[test]
    fn status_path_decodes_its_leaf() {
        let to_ap = DeviceStatus::parse("STARTED-CONNECTING-CONNECTING_TO_AP");
        assert_eq!(to_ap, DeviceStatus::ConnectingToAp);
        assert!(to_ap.is_connecting());

        let sending = DeviceStatus::parse("STARTED-CONNECTED-SEND");
        assert_eq!(sending, DeviceStatus::Link("SEND".into()));
        assert!(sending.is_connecting());

        let stopped = DeviceStatus::parse("STOPPED");
        assert_eq!(stopped, DeviceStatus::Link("STOPPED".into()));
        assert!(!stopped.is_connecting());

        assert_eq!(DeviceStatus::parse("STARTED-GARBLED"), DeviceStatus::Other("STARTED-GARBLED".into()));
    }

    #[test]
    fn brownout_counts_as_idle() {
        let status = DeviceStatus::parse("BROWNOUT");
        assert_eq!(status, DeviceStatus::Brownout);
        assert!(status.is_idle());
        assert!(!status.is_connecting());
        assert!(!DeviceStatus::Acquisition.is_idle());
        assert_eq!(status.as_wire(), "BROWNOUT");
    }

    #[test]
    fn decodes_readings_records() {
        let frame = Frame::parse("READINGS R:1514824768,T:23.51,P:1001.20,H:40.00|R:1514824833,M:1.00;");
        let outcome = ReadingsOutcome::from_frame(&frame, &READINGS_SCHEMA).unwrap();
        assert_eq!(outcome.len(), 2);
        let first = &outcome.records()[0];
        assert_eq!(first.float('T'), Some(23.51));
        assert_eq!(first.timestamp().map(|t| t.timestamp()), Some(1514824768));
        assert_eq!(outcome.records()[1].float('M'), Some(1.0));
        assert!(outcome.records()[1].get('T').is_none());
    }

    #[test]
    fn empty_and_rejected_readings() {
        let empty = ReadingsOutcome::from_frame(&Frame::parse("READINGS;"), &READINGS_SCHEMA).unwrap();
        assert_eq!(empty, ReadingsOutcome::Empty);
        assert!(empty.is_accepted());

        let rejected =
            ReadingsOutcome::from_frame(&Frame::parse("BAD_REQUEST;"), &READINGS_SCHEMA).unwrap();
        assert_eq!(rejected, ReadingsOutcome::Rejected);
        assert!(!rejected.is_accepted());

        assert!(ReadingsOutcome::from_frame(&Frame::parse("PORT 8883;"), &READINGS_SCHEMA).is_err());
    }

    #[test]
    fn system_schema_types() {
        let records = parse_records("R:1514824768,E:3,B:2980,V:4.3.6", &SYSTEM_SCHEMA).unwrap();
        assert_eq!(records[0].get('E'), Some(&FieldValue::Uint(3)));
        assert_eq!(records[0].get('V'), Some(&FieldValue::String("4.3.6".into())));
        assert_eq!(records[0].get('B').and_then(FieldValue::as_i64), Some(2980));
    }

    #[test]
    fn bad_numeric_field_is_an_error() {
        assert!(parse_records("R:now,T:1.00", &READINGS_SCHEMA).is_err());
        assert!(parse_records("R:1,T:warm", &READINGS_SCHEMA).is_err());
    }

    #[test]
    fn extracts_fields_in_any_order() {
        let line = "READINGS R:1514824768,H:40.00,T:23.51;";
        let t = extract_field(line, 'T', FieldType::Float).unwrap();
        assert_eq!(t.and_then(|v| v.as_f64()), Some(23.51));
        assert!(extract_field(line, 'P', FieldType::Float).unwrap().is_none());
        assert!(extract_field("READINGS R:1,T:x;", 'T', FieldType::Float).is_err());
    }
}
