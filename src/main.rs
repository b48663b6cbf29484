//! CLI entry point for the WolkSensor functional test harness
//!
//! Provides command-line interface for:
//! - Running the test stages against an attached sensor or the simulator
//! - Listing serial ports with their USB metadata
//! - Sending a single command and inspecting the parsed reply
//!
//! # Usage
//!
//! Run every stage against the sensor on the FTDI bridge:
//! ```bash
//! wolksensor-harness run
//! ```
//!
//! Run only the robustness stage against the simulated device:
//! ```bash
//! wolksensor-harness run --stage robustness --simulate
//! ```
//!
//! Query one parameter:
//! ```bash
//! wolksensor-harness send "VERSION;"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use wolksensor_harness::config::{HarnessConfig, TimingConfig};
use wolksensor_harness::error::{AppResult, HarnessError};
use wolksensor_harness::logging;
use wolksensor_harness::protocol::{classify, Frame};
use wolksensor_harness::suites::{self, exit_code_for, Stage, EXIT_FAILED, EXIT_PASSED};
use wolksensor_harness::transport::simulated::{Reachable, SimulatedDevice};
use wolksensor_harness::transport::Transport;

#[derive(Parser)]
#[command(name = "wolksensor-harness")]
#[command(about = "Functional tests for the WolkSensor serial protocol", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/wolksensor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Configuration profile (default, staging, production)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Talk to the in-memory simulated device instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test stages (all of them when none is given)
    Run {
        /// Stage to run; repeat to select several
        #[arg(long, value_enum)]
        stage: Vec<Stage>,
    },

    /// List serial ports with USB metadata
    Ports,

    /// Send one raw command and print the parsed reply
    Send {
        /// Command text, e.g. "VERSION;"
        line: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<HarnessError>()
                .map(exit_code_for)
                .unwrap_or(EXIT_FAILED)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn dispatch(cli: Cli) -> Result<i32> {
    let path = HarnessConfig::resolve_path(cli.config.as_deref());
    let mut config = HarnessConfig::load_from(&path, cli.profile.as_deref())
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    logging::init_from_config(&config)
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize logging")?;
    info!(config = %path.display(), name = %config.application.name, "Configuration loaded");

    // The simulated device has no acquisition period or operator to wait for.
    if cli.simulate {
        config.timing = TimingConfig::immediate();
    }

    match cli.command {
        Commands::Run { stage } => with_transport(&config, cli.simulate, |transport| {
            let report = suites::run(transport, &config, &stage)?;
            for (stage, passed) in &report.stages {
                println!("{:<24} {}", stage.name(), if *passed { "PASSED" } else { "FAILED" });
            }
            Ok(report.exit_code())
        }),
        Commands::Ports => list_ports(&config),
        Commands::Send { line } => with_transport(&config, cli.simulate, |transport| {
            let frame = Frame::parse(&transport.exchange(&line)?);
            print_frame(&frame);
            Ok(EXIT_PASSED)
        }),
    }
}

fn with_transport<F>(config: &HarnessConfig, simulate: bool, body: F) -> Result<i32>
where
    F: FnOnce(&mut dyn Transport) -> AppResult<i32>,
{
    if simulate {
        let mut device = SimulatedDevice::new(Reachable::from(&config.network)).with_echo(config.serial.echo);
        return Ok(body(&mut device)?);
    }
    with_serial(config, body)
}

#[cfg(feature = "instrument_serial")]
fn with_serial<F>(config: &HarnessConfig, body: F) -> Result<i32>
where
    F: FnOnce(&mut dyn Transport) -> AppResult<i32>,
{
    use std::io::{BufRead, Write};
    use tracing::warn;
    use wolksensor_harness::transport::serial::{close_serial, open_serial, PortOutcome};

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();

    let mut attempts = 0;
    let mut transport = loop {
        match open_serial(&config.serial, &mut input, &mut output)? {
            PortOutcome::Opened(transport) => break transport,
            PortOutcome::Quit => {
                info!("Port selection cancelled");
                return Ok(EXIT_PASSED);
            }
            PortOutcome::Busy(name) => {
                attempts += 1;
                if attempts >= config.serial.open_attempts {
                    return Err(HarnessError::PortUnavailable(format!("{} is open in another program", name)).into());
                }
                warn!(port = %name, attempts, "Serial port busy");
                write!(output, "Close the program using {} and press Enter to retry: ", name)?;
                output.flush()?;
                input.read_line(&mut String::new())?;
            }
        }
    };

    let result = body(&mut transport);
    close_serial(transport);
    Ok(result?)
}

#[cfg(not(feature = "instrument_serial"))]
fn with_serial<F>(_config: &HarnessConfig, _body: F) -> Result<i32>
where
    F: FnOnce(&mut dyn Transport) -> AppResult<i32>,
{
    Err(HarnessError::SerialFeatureDisabled.into())
}

#[cfg(feature = "instrument_serial")]
fn list_ports(config: &HarnessConfig) -> Result<i32> {
    let ports = wolksensor_harness::transport::serial::list_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let marker = if port.matches(config.serial.usb_vid, config.serial.usb_pid) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, port);
    }
    Ok(EXIT_PASSED)
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports(_config: &HarnessConfig) -> Result<i32> {
    Err(HarnessError::SerialFeatureDisabled.into())
}

fn print_frame(frame: &Frame) {
    println!("raw:        {:?}", frame.raw());
    println!("terminated: {}", frame.is_terminated());
    for token in frame.tokens() {
        match &token.payload {
            Some(payload) => println!("  {} = {:?}", token.name, payload),
            None => println!("  {}", token.name),
        }
    }
    match classify(frame) {
        Some(reason) => println!("unwanted:   {:?}", reason),
        None => println!("unwanted:   no"),
    }
}
