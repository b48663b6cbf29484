//! Data-driven stage: accepted and rejected value tables per parameter.

use super::scenario;
use crate::config::HarnessConfig;
use crate::engine::Engine;
use crate::error::AppResult;
use crate::protocol::ReadingsOutcome;
use crate::report;
use crate::transport::Transport;
use tracing::error;

const SYMBOLS: &str = "!\")(*&^%";
/// Carries its own terminator, so the device sees two commands.
const SYMBOLS_TERMINATED: &str = "!\")(*&^%;";
const BACKSLASHED: &str = "\\Test1234";
const DIGITS_70: &str = "0123456789012345678901234567890123456789012345678901234567890123456789";
const LETTERS_64: &str = "qwertyuiopqwertyuiopqwertyuiopqwertyuiopqwertyuiopqwertyuiopqwer";
const LETTERS_63: &str = "qwertyuiopqwertyuiopqwertyuiopqwertyuiopqwertyuiopqwertyuiopqwe";
const LETTERS_33: &str = "qwertyuiopqwertyuiopqwertyuiopqwe";
const LETTERS_32: &str = "qwertyuiopqwertyuiopqwertyuiopqw";

/// One parameter with the values it must store and the values it must refuse.
struct Case {
    parameter: &'static str,
    accepted: &'static [&'static str],
    rejected: &'static [&'static str],
}

const URL_ACCEPTED: &[&str] = &[
    "8.8.8.8",
    "0.0.0.0",
    "255.255.255.255",
    "appwolksense.com",
    "app-wolksense.com",
    "9gag.com",
    "automatika.ftn.uns.ac.rs",
    "ftn.uns.ac.rs",
];

const URL_REJECTED: &[&str] = &[
    "",
    "-1.-1.-1.-1",
    "256.256.256.256",
    "appwolksense",
    "-app.wolksense",
    "app.wolksense-",
    "app.wolksense*com",
    "9821.com.123",
    "9gag.123.com",
    "abc.123.abc.abc",
    "app.wolksense.comapp.wolksense.comapp.wolksense.comapp.wolksense.comapp.wolksense.com",
    BACKSLASHED,
    SYMBOLS_TERMINATED,
];

const CREDENTIALS: &[Case] = &[
    Case {
        parameter: "SSID",
        accepted: &["mywirelessnetwork", "1234567890", "m4w1r3l3ssn3tw0rk", LETTERS_32, "", SYMBOLS, "\n\r", "WA_1"],
        rejected: &[LETTERS_33],
    },
    Case {
        parameter: "AUTH",
        accepted: &["NONE", "WEP", "WPA", "WPA2"],
        rejected: &["", "WPA Ent", "0123456789"],
    },
    Case {
        parameter: "PASS",
        accepted: &[
            "mywirelessnetworkpassword",
            "1234567890",
            "m4w1r3l3ssn3tw0rkpassw0rd",
            LETTERS_63,
            "",
            SYMBOLS,
            "\n\r",
            "wolksensorsystem",
        ],
        rejected: &[LETTERS_64, DIGITS_70],
    },
];

/// PASS while AUTH is WEP: exactly 26 hex digits.
const WEP_KEYS: Case = Case {
    parameter: "PASS",
    accepted: &[
        "008C7073C348F91054E1FB8729",
        "00000000000000000000000000",
        "FFFFFFFFFFFFFFFFFFFFFFFFFF",
        "3164E175384E17240A78CE63D3",
    ],
    rejected: &[LETTERS_64, DIGITS_70, SYMBOLS, "\n\r", ""],
};

const ADDRESS_REJECTED: &[&str] = &[
    "ON",
    "",
    "-1.-1.-1.-1",
    "256.256.256.256",
    "app.wolkabout.com",
    BACKSLASHED,
    SYMBOLS_TERMINATED,
];

const SETTINGS: &[Case] = &[
    Case {
        parameter: "RTC",
        accepted: &["0", "1470236756", "4294967295", "1388588755"],
        rejected: &["", "-1", "12345678901234567890123456789", "timecountdown", "t1m3c0u5td0wn", SYMBOLS],
    },
    Case {
        parameter: "PORT",
        accepted: &["1883", "0", "65535", "8883"],
        rejected: &["", "-5", "65536", "mynetworkport", "m4n3tw0rkp0rt", SYMBOLS, DIGITS_70, LETTERS_64],
    },
    Case {
        parameter: "HEARTBEAT",
        accepted: &["5", "10", "30", "0", "60"],
        rejected: &["", "-1", "61", "65535", "1234567890", "heartbeatcount", SYMBOLS, DIGITS_70, LETTERS_64],
    },
    Case {
        parameter: "MOVEMENT",
        accepted: &["ON", "OFF"],
        rejected: &["", "yes", "NO", "0123", "movement", "m0v3m3nt", DIGITS_70, LETTERS_64],
    },
    Case {
        parameter: "ATMO",
        accepted: &["ON", "OFF"],
        rejected: &["", "yes", "NO", "0123", "atmo", "4tm0", DIGITS_70, LETTERS_64],
    },
    Case {
        parameter: "STATIC_MASK",
        accepted: &["192.168.15.98", "0.0.0.0", "255.255.255.255", "255.255.255.0"],
        rejected: ADDRESS_REJECTED,
    },
    Case {
        parameter: "STATIC_GATEWAY",
        accepted: &["192.168.15.98", "0.0.0.0", "255.255.255.255", "192.168.15.1"],
        rejected: ADDRESS_REJECTED,
    },
    Case {
        parameter: "STATIC_DNS",
        accepted: &["192.168.15.98", "0.0.0.0", "255.255.255.255", "8.8.4.4"],
        rejected: ADDRESS_REJECTED,
    },
    Case {
        parameter: "STATIC_IP",
        accepted: &["192.168.15.98", "0.0.0.0", "255.255.255.255", "OFF"],
        rejected: ADDRESS_REJECTED,
    },
];

const OFFSETS: &[Case] = &[
    Case {
        parameter: "TEMP_OFFSET",
        accepted: &["0", "1", "-1", "37", "-20"],
        rejected: &["38", "-21", "", "-1.temperature.+1.QWE", "app.wolkabout.com", BACKSLASHED, SYMBOLS_TERMINATED],
    },
    Case {
        parameter: "HUMIDITY_OFFSET",
        accepted: &["0", "1", "-1", "30", "-30"],
        rejected: &["31", "-31", "", "-1.humidity.+1.QWE", "app.wolkabout.com", BACKSLASHED, SYMBOLS_TERMINATED],
    },
    Case {
        parameter: "PRESSURE_OFFSET",
        accepted: &["0", "1", "-1", "100", "-100"],
        rejected: &["101", "-101", "", "-1.pressure.+1.QWE", "app.wolkabout.com", BACKSLASHED, SYMBOLS_TERMINATED],
    },
    Case {
        parameter: "OFFSET_FACTORY",
        accepted: &["RESET"],
        rejected: &["RESETTOFACTORY", "RESE", "", "-1.pressure.+1.QWE", "app.wolkabout.com", BACKSLASHED, SYMBOLS_TERMINATED],
    },
    Case {
        parameter: "ACQUISITION",
        accepted: &[],
        rejected: &["empty", "CLEAR", "", "-1.pressure.+1.QWE", SYMBOLS_TERMINATED],
    },
];

/// Read-only parameters with a write each must refuse.
const READ_ONLY: &[(&str, &str)] = &[
    ("STATUS", "change status"),
    ("VERSION", "which version"),
    ("ID", "identifier"),
    ("SIGNATURE", "some signature"),
    ("MAC", "11223344aaBBccDD"),
];

/// Arguments READINGS and SYSTEM must refuse.
const RECORD_ARGUMENTS_REJECTED: &[&str] = &[
    "-1.-1.-1.-1",
    "256.256.256.256",
    "app.wolkabout.com",
    BACKSLASHED,
    SYMBOLS_TERMINATED,
];

/// Runs every value table, then leaves Wi-Fi on throwaway credentials and the
/// server endpoint on the configured reference.
pub fn run<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
    let mut passed = true;

    report!("Turning off all functionalities");
    engine.ensure("MOVEMENT OFF", |e| e.test("MOVEMENT", &["OFF"], &[]))?;
    engine.ensure("ATMO OFF", |e| e.test("ATMO", &["OFF"], &[]))?;
    engine.ensure("SSID NULL", |e| e.test("SSID", &["NULL"], &[]))?;
    engine.ensure("PASS NULL", |e| e.test("PASS", &["NULL"], &[]))?;
    engine.ensure("AUTH NONE", |e| e.test("AUTH", &["NONE"], &[]))?;

    for (parameter, write) in READ_ONLY {
        passed &= scenario(parameter, || {
            let reported = engine.protocol_parser(parameter, false, "", true)?;
            let refused = engine.protocol_parser(parameter, true, write, false)?;
            Ok(reported && refused)
        })?;
    }

    let mut url_accepted: Vec<&str> = URL_ACCEPTED.to_vec();
    url_accepted.push(config.network.url.as_str());
    url_accepted.push(config.network.hostname.as_str());
    passed &= scenario("URL", || engine.test("URL", &url_accepted, URL_REJECTED))?;

    for case in CREDENTIALS {
        passed &= run_case(engine, case)?;
    }

    passed &= scenario("PASS with WEP", || {
        let wep = engine.test("AUTH", &["WEP"], &[])?;
        let keys = engine.test(WEP_KEYS.parameter, WEP_KEYS.accepted, WEP_KEYS.rejected)?;
        let wpa2 = engine.test("AUTH", &["WPA2"], &[])?;
        Ok(wep && keys && wpa2)
    })?;

    for case in SETTINGS {
        passed &= run_case(engine, case)?;
    }

    passed &= scenario("READINGS", || record_arguments(engine, true))?;
    passed &= scenario("SYSTEM", || record_arguments(engine, false))?;

    for case in OFFSETS {
        passed &= run_case(engine, case)?;
    }

    let network = &config.network;
    passed &= scenario("Reference endpoint", || {
        let url = engine.test("URL", &[network.hostname.as_str()], &[])?;
        let port = engine.test("PORT", &[network.port.as_str()], &[])?;
        let rtc = engine.test("RTC", &[network.rtc.as_str()], &[])?;
        Ok(url && port && rtc)
    })?;

    passed &= scenario("Wi-Fi parameters", || {
        engine.set_wifi_parameters("WA_1", "WPA2", "wolksensorsystem")
    })?;

    Ok(passed)
}

fn run_case<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, case: &Case) -> AppResult<bool> {
    scenario(case.parameter, || engine.test(case.parameter, case.accepted, case.rejected))
}

/// `READINGS`/`SYSTEM` must answer a bare query and `CLEAR`, and refuse
/// anything else.
fn record_arguments<T: Transport + ?Sized>(engine: &mut Engine<'_, T>, readings: bool) -> AppResult<bool> {
    let mut passed = true;
    for argument in ["", "CLEAR"] {
        passed &= if readings {
            engine.readings_accepted(argument)?
        } else {
            engine.system_accepted(argument)?
        };
    }
    for argument in RECORD_ARGUMENTS_REJECTED {
        let outcome = if readings {
            engine.parse_readings(argument)?
        } else {
            engine.parse_system_reading(argument)?
        };
        if outcome != Some(ReadingsOutcome::Rejected) {
            error!(argument = %argument.escape_default(), ?outcome, "Invalid argument was not refused");
            passed = false;
        }
    }
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_disjoint() {
        let all = CREDENTIALS.iter().chain(SETTINGS).chain(OFFSETS).chain(std::iter::once(&WEP_KEYS));
        for case in all {
            for value in case.accepted {
                assert!(!case.rejected.contains(value), "{} {:?}", case.parameter, value);
            }
        }
        for value in URL_ACCEPTED {
            assert!(!URL_REJECTED.contains(value));
        }
    }

    #[test]
    fn length_boundaries() {
        assert_eq!(LETTERS_32.len(), 32);
        assert_eq!(LETTERS_33.len(), 33);
        assert_eq!(LETTERS_63.len(), 63);
        assert_eq!(LETTERS_64.len(), 64);
        assert_eq!(DIGITS_70.len(), 70);
    }
}
