//! Harness configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/wolksensor.toml` (profiles `[default]`, `[staging]`, `[production]`)
//! 2. Environment variables prefixed with `WOLKSENSOR_`, nested keys split on `__`
//!
//! Every field has a default, so a missing file yields the reference setup.
//!
//! # Example
//! ```no_run
//! use wolksensor_harness::config::HarnessConfig;
//!
//! let config = HarnessConfig::load(Some("staging"))?;
//! println!("Server: {}:{}", config.network.url, config.network.port);
//! # Ok::<(), wolksensor_harness::error::HarnessError>(())
//! ```

use crate::error::{AppResult, HarnessError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Profile,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/wolksensor.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WOLKSENSOR_";

/// Environment variable that selects the profile when none is given.
pub const PROFILE_ENV: &str = "WOLKSENSOR_PROFILE";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Harness name and logging.
    pub application: ApplicationConfig,
    /// Serial link.
    pub serial: SerialConfig,
    /// Reference credentials and endpoint.
    pub network: NetworkConfig,
    /// Waits and poll caps.
    pub timing: TimingConfig,
    /// Device properties the checks compare against.
    pub device: DeviceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Shown in the run banner
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Output format (pretty, compact, json)
    pub log_format: String,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Explicit port path; discovered by VID/PID when unset
    pub port: Option<String>,
    /// USB vendor id of the sensor's bridge
    pub usb_vid: u16,
    /// USB product id of the sensor's bridge
    pub usb_pid: u16,
    /// Line speed
    pub baud_rate: u32,
    /// Overall wait for a reply
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Delay after each send before the reply is read
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Quiet time that ends a multi-token reply
    #[serde(with = "humantime_serde")]
    pub frame_gap: Duration,
    /// Log every exchange at debug instead of trace
    pub echo: bool,
    /// Prompts allowed while the selected port is busy
    pub open_attempts: u32,
}

/// Reference network credentials and server endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Access point the device can reach
    pub ssid: String,
    /// NONE, WEP, WPA or WPA2
    pub auth: String,
    /// Passphrase, or a hex key with WEP
    pub pass: String,
    /// Server address as a dotted quad
    pub url: String,
    /// Server host name
    pub hostname: String,
    /// Server port
    pub port: String,
    /// Epoch seconds the device clock is set to
    pub rtc: String,
}

/// Waits and poll caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Cap on the STATUS poll that waits for IDLE
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Delay between STATUS polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Cap on a `NOW` connection attempt
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Cap on waiting for a movement event
    #[serde(with = "humantime_serde")]
    pub movement_timeout: Duration,
    /// Countdown covering one device acquisition period
    #[serde(with = "humantime_serde")]
    pub acquisition_period: Duration,
    /// Countdown during which the operator may move the device
    #[serde(with = "humantime_serde")]
    pub movement_window: Duration,
    /// Allowed drift when reading back RTC
    #[serde(with = "humantime_serde")]
    pub rtc_tolerance: Duration,
}

/// Properties of the device under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Entries the readings ring holds
    pub readings_capacity: usize,
    /// Characters in the device ID
    pub id_length: usize,
    /// Hex digits in the MAC
    pub mac_length: usize,
    /// Expected SIGNATURE reply
    pub signature: String,
    /// Window around each applied offset delta
    pub offset_tolerance: f64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "WolkSensor Functional Tests".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            usb_vid: 0x0403,
            usb_pid: 0x6015,
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(2),
            settle: Duration::from_millis(100),
            frame_gap: Duration::from_millis(50),
            echo: true,
            open_attempts: 3,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: "wolkabout".to_string(),
            auth: "WPA2".to_string(),
            pass: "Walkm3int0".to_string(),
            url: "52.213.16.227".to_string(),
            hostname: "api-demo.wolkabout.com".to_string(),
            port: "8883".to_string(),
            rtc: "1514824768".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(60),
            movement_timeout: Duration::from_secs(120),
            acquisition_period: Duration::from_secs(65),
            movement_window: Duration::from_secs(5),
            rtc_tolerance: Duration::from_secs(5),
        }
    }
}

impl TimingConfig {
    /// Timing for the in-memory device: no wall-clock countdowns, short caps.
    pub fn immediate() -> Self {
        Self {
            idle_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(2),
            movement_timeout: Duration::from_secs(2),
            acquisition_period: Duration::ZERO,
            movement_window: Duration::ZERO,
            rtc_tolerance: Duration::from_secs(5),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            readings_capacity: 180,
            id_length: 16,
            mac_length: 12,
            signature: "****".to_string(),
            offset_tolerance: 0.5,
        }
    }
}

impl HarnessConfig {
    /// Load from the default path with the given profile (or `WOLKSENSOR_PROFILE`)
    pub fn load(profile: Option<&str>) -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH, profile)
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables override the file in every profile, e.g.
    /// `WOLKSENSOR_SERIAL__PORT=/dev/ttyUSB0`.
    pub fn load_from<P: AsRef<Path>>(path: P, profile: Option<&str>) -> AppResult<Self> {
        let profile = match profile {
            Some(name) => Profile::new(name),
            None => Profile::from_env_or(PROFILE_ENV, Profile::Default),
        };
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()).nested())
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["PROFILE"])
                    .split("__")
                    .global(),
            )
            .select(profile)
            .extract()?;
        config.validate().map_err(HarnessError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        let valid_auth = ["NONE", "WEP", "WPA", "WPA2"];
        if !valid_auth.contains(&self.network.auth.as_str()) {
            return Err(format!(
                "Invalid network.auth '{}'. Must be one of: {}",
                self.network.auth,
                valid_auth.join(", ")
            ));
        }

        if self.network.port.parse::<u16>().is_err() {
            return Err(format!(
                "Invalid network.port '{}'. Must be 0-65535",
                self.network.port
            ));
        }

        if self.network.rtc.parse::<u32>().is_err() {
            return Err(format!("Invalid network.rtc '{}'", self.network.rtc));
        }

        if self.device.readings_capacity == 0 {
            return Err("device.readings_capacity must be greater than zero".to_string());
        }

        if self.timing.poll_interval.is_zero() {
            return Err("timing.poll_interval must be greater than zero".to_string());
        }

        if self.device.offset_tolerance <= 0.0 {
            return Err(format!(
                "Invalid device.offset_tolerance {}. Must be positive",
                self.device.offset_tolerance
            ));
        }

        Ok(())
    }

    /// Path of the file that would be read for `path` (used in startup logs).
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}
