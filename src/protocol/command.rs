//! Commands and the parameter table.
//!
//! Every key the device understands is described once in [`PARAMETERS`]. The
//! table drives three decisions: whether a parameter may be written, whether a
//! write can be read back, and how two textual values of the parameter are
//! compared.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Terminates every command and every reply token on the wire.
pub const TERMINATOR: char = ';';

/// Separates a command name from its argument.
pub const ARGUMENT_SEPARATOR: char = ' ';

/// Argument that clears a text parameter (SSID, PASS) on the device.
pub const NULL_ARGUMENT: &str = "NULL";

/// A single protocol command: `NAME;` or `NAME argument;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    argument: Option<String>,
}

impl Command {
    /// A bare query such as `STATUS;`.
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: None,
        }
    }

    /// A write such as `PORT 8883;`. An empty argument is still sent as `PORT ;`.
    pub fn set(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: Some(argument.into()),
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument of a write, `None` for a query.
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Wire form including the terminator.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(argument) => write!(f, "{}{}{}{}", self.name, ARGUMENT_SEPARATOR, argument, TERMINATOR),
            None => write!(f, "{}{}", self.name, TERMINATOR),
        }
    }
}

/// What the harness is allowed to do with a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Settable and readable; a write is verified by reading it back.
    ReadWrite,
    /// Reported by the device only; writes must be refused.
    ReadOnly,
    /// Triggers an action; there is nothing to read back.
    Action,
    /// Queried for buffered records, optionally with `CLEAR`.
    Records,
}

/// How values of a parameter are normalised before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Free text, compared trimmed. `NULL` means empty.
    Text,
    /// Whole number, compared by value.
    Integer,
    /// Fixed-point decimal, compared by value.
    Decimal,
    /// Dotted quad, host name or `OFF`, compared literally.
    Address,
    /// Enumerated token (`ON`, `WPA2`), compared exactly.
    Token,
    /// Seconds since the epoch on a running clock.
    Epoch,
    /// No comparable value.
    Unit,
}

/// One row of the parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    /// Wire name.
    pub name: &'static str,
    /// What a write is expected to do.
    pub access: Access,
    /// How read-backs are compared.
    pub kind: ValueKind,
}

const fn param(name: &'static str, access: Access, kind: ValueKind) -> Parameter {
    Parameter { name, access, kind }
}

/// All keys recognised by the device.
pub const PARAMETERS: &[Parameter] = &[
    param("SSID", Access::ReadWrite, ValueKind::Text),
    param("PASS", Access::ReadWrite, ValueKind::Text),
    param("AUTH", Access::ReadWrite, ValueKind::Token),
    param("URL", Access::ReadWrite, ValueKind::Address),
    param("HOSTNAME", Access::ReadWrite, ValueKind::Address),
    param("PORT", Access::ReadWrite, ValueKind::Integer),
    param("HEARTBEAT", Access::ReadWrite, ValueKind::Integer),
    param("MOVEMENT", Access::ReadWrite, ValueKind::Token),
    param("ATMO", Access::ReadWrite, ValueKind::Token),
    param("RTC", Access::ReadWrite, ValueKind::Epoch),
    param("STATIC_IP", Access::ReadWrite, ValueKind::Address),
    param("STATIC_MASK", Access::ReadWrite, ValueKind::Address),
    param("STATIC_GATEWAY", Access::ReadWrite, ValueKind::Address),
    param("STATIC_DNS", Access::ReadWrite, ValueKind::Address),
    param("TEMP_OFFSET", Access::ReadWrite, ValueKind::Decimal),
    param("HUMIDITY_OFFSET", Access::ReadWrite, ValueKind::Decimal),
    param("PRESSURE_OFFSET", Access::ReadWrite, ValueKind::Decimal),
    param("OFFSET_FACTORY", Access::Action, ValueKind::Unit),
    param("ACQUISITION", Access::Action, ValueKind::Unit),
    param("NOW", Access::Action, ValueKind::Unit),
    param("RELOAD", Access::Action, ValueKind::Unit),
    param("READINGS", Access::Records, ValueKind::Unit),
    param("SYSTEM", Access::Records, ValueKind::Unit),
    param("STATUS", Access::ReadOnly, ValueKind::Token),
    param("VERSION", Access::ReadOnly, ValueKind::Text),
    param("ID", Access::ReadOnly, ValueKind::Text),
    param("SIGNATURE", Access::ReadOnly, ValueKind::Text),
    param("MAC", Access::ReadOnly, ValueKind::Text),
];

impl Parameter {
    /// Looks a parameter up by its exact wire name.
    pub fn lookup(name: &str) -> Option<&'static Parameter> {
        PARAMETERS.iter().find(|p| p.name == name)
    }

    /// Whether a write can be confirmed by a follow-up query.
    pub fn has_read_back(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

impl ValueKind {
    /// Canonical text of a value, or `None` when it does not parse for this kind.
    ///
    /// Only used for display and for kinds compared literally; numeric kinds
    /// go through [`ValueKind::matches`].
    pub fn normalize(&self, raw: Option<&str>) -> Option<String> {
        let raw = raw.unwrap_or("").trim();
        match self {
            ValueKind::Text => Some(if raw == NULL_ARGUMENT { String::new() } else { raw.to_string() }),
            ValueKind::Integer | ValueKind::Epoch => raw.parse::<i64>().ok().map(|v| v.to_string()),
            ValueKind::Decimal => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| if v == 0.0 { "0".to_string() } else { v.to_string() }),
            ValueKind::Address => {
                if let Ok(ip) = raw.parse::<Ipv4Addr>() {
                    Some(ip.to_string())
                } else {
                    Some(raw.to_string())
                }
            }
            ValueKind::Token | ValueKind::Unit => Some(raw.to_string()),
        }
    }

    /// Whether the value read back from the device equals the expected one.
    ///
    /// `tolerance` only applies to [`ValueKind::Epoch`], where the device
    /// clock keeps running between the write and the read.
    pub fn matches(&self, expected: &str, actual: Option<&str>, tolerance: Duration) -> bool {
        match self {
            ValueKind::Integer => match (parse_int(Some(expected)), parse_int(actual)) {
                (Some(e), Some(a)) => e == a,
                _ => false,
            },
            ValueKind::Epoch => match (parse_int(Some(expected)), parse_int(actual)) {
                (Some(e), Some(a)) => e.abs_diff(a) <= tolerance.as_secs(),
                _ => false,
            },
            ValueKind::Decimal => match (parse_decimal(Some(expected)), parse_decimal(actual)) {
                (Some(e), Some(a)) => (e - a).abs() < 1e-6,
                _ => false,
            },
            _ => {
                let expected = self.normalize(Some(expected));
                expected.is_some() && expected == self.normalize(actual)
            }
        }
    }
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form() {
        assert_eq!(Command::query("STATUS").to_wire(), "STATUS;");
        assert_eq!(Command::set("PORT", "8883").to_wire(), "PORT 8883;");
        assert_eq!(Command::set("SSID", "").to_wire(), "SSID ;");
    }

    #[test]
    fn lookup_is_exact() {
        assert_eq!(Parameter::lookup("PORT").map(|p| p.kind), Some(ValueKind::Integer));
        assert!(Parameter::lookup("port").is_none());
        assert!(Parameter::lookup("PORT1").is_none());
        assert!(!Parameter::lookup("ACQUISITION").unwrap().has_read_back());
    }

    #[test]
    fn numbers_compare_by_value() {
        let zero = Duration::ZERO;
        assert!(ValueKind::Integer.matches("08883", Some("8883"), zero));
        assert!(ValueKind::Decimal.matches("1", Some("1.00"), zero));
        assert!(ValueKind::Decimal.matches("-0", Some("0"), zero));
        assert!(!ValueKind::Decimal.matches("1", Some("1.5"), zero));
        assert!(!ValueKind::Integer.matches("1", None, zero));
    }

    #[test]
    fn epoch_allows_clock_drift() {
        let tolerance = Duration::from_secs(5);
        assert!(ValueKind::Epoch.matches("1470236756", Some("1470236759"), tolerance));
        assert!(!ValueKind::Epoch.matches("1470236756", Some("1470236799"), tolerance));
    }

    #[test]
    fn text_treats_null_as_empty() {
        let zero = Duration::ZERO;
        assert!(ValueKind::Text.matches("NULL", None, zero));
        assert!(ValueKind::Text.matches("\n\r", Some(""), zero));
        assert!(ValueKind::Text.matches("WA_1", Some("WA_1"), zero));
        assert!(!ValueKind::Token.matches("ON", Some("on"), zero));
    }
}
