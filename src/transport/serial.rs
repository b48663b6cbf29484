//! Serial port transport for a WolkSensor on a USB-serial bridge.
//!
//! The port is owned by [`SerialTransport`] for the whole run and closed when
//! the transport is dropped or passed to [`close_serial`].

use crate::config::SerialConfig;
use crate::error::{AppResult, HarnessError};
use crate::protocol::command::TERMINATOR;
use crate::transport::{echo, Direction, Transport};
use serialport::{SerialPort, SerialPortType};
use std::io::{BufRead, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll granularity of the underlying port.
const PORT_POLL: Duration = Duration::from_millis(10);

/// Result of trying to acquire the device's port.
pub enum PortOutcome {
    /// The port is open and owned by the transport.
    Opened(SerialTransport),
    /// The operator asked to quit at the port prompt.
    Quit,
    /// The port is open in another program.
    Busy(String),
}

/// Serial transport that owns the open port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    read_timeout: Duration,
    settle: Duration,
    frame_gap: Duration,
    echo: bool,
}

impl SerialTransport {
    /// Opens `name` with the configured baud rate and timings.
    pub fn open(name: &str, config: &SerialConfig) -> AppResult<Self> {
        let port = serialport::new(name, config.baud_rate)
            .timeout(PORT_POLL)
            .open()?;
        info!(port = name, baud_rate = config.baud_rate, "Opened serial port");
        Ok(Self {
            port,
            name: name.to_string(),
            read_timeout: config.read_timeout,
            settle: config.settle,
            frame_gap: config.frame_gap,
            echo: config.echo,
        })
    }

    /// Port path.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, text: &str) -> AppResult<()> {
        echo(self.echo, &self.name, Direction::Sent, text);
        self.port.write_all(text.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Reads until the reply ends on a terminator and the line has then been
    /// quiet for `frame_gap`, or until `timeout`.
    fn receive_timeout(&mut self, timeout: Duration) -> AppResult<String> {
        let mut buffer = [0u8; 256];
        let mut response = String::new();
        let start = Instant::now();
        let mut last_data = start;

        while start.elapsed() < timeout {
            match self.port.read(&mut buffer) {
                Ok(0) => return Err(HarnessError::SerialUnexpectedEof),
                Ok(n) => {
                    response.push_str(&String::from_utf8_lossy(&buffer[..n]));
                    last_data = Instant::now();
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // Port timeout is shorter than our overall timeout
                }
                Err(e) => return Err(HarnessError::Io(e)),
            }

            if response.trim_end().ends_with(TERMINATOR) && last_data.elapsed() >= self.frame_gap {
                break;
            }
            std::thread::sleep(PORT_POLL);
        }

        let response = response.trim().to_string();
        echo(self.echo, &self.name, Direction::Received, &response);
        Ok(response)
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn settle(&self) -> Duration {
        self.settle
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!(port = %self.name, "Closing serial port");
    }
}

/// Closes the port explicitly.
pub fn close_serial(transport: SerialTransport) {
    info!(port = %transport.name, "Released serial port");
    drop(transport);
}

/// USB metadata of an available port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSummary {
    /// Port path
    pub name: String,
    /// USB vendor id
    pub vid: Option<u16>,
    /// USB product id
    pub pid: Option<u16>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    /// USB serial number
    pub serial_number: Option<String>,
}

impl PortSummary {
    /// Whether the port belongs to the given USB device.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

impl std::fmt::Display for PortSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04X}:{:04X}]", vid, pid)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, " (S/N {})", serial)?;
        }
        Ok(())
    }
}

/// Lists serial ports with their USB metadata.
pub fn list_ports() -> AppResult<Vec<PortSummary>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortSummary {
                name: port.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => PortSummary {
                name: port.port_name,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        })
        .collect())
}

/// Acquires the device port.
///
/// Resolution order: `config.port`, then the first USB port matching the
/// configured VID/PID, then an operator prompt on `input`/`output` listing all
/// ports. Entering `q` at the prompt yields [`PortOutcome::Quit`].
pub fn open_serial<R: BufRead, W: Write>(
    config: &SerialConfig,
    input: &mut R,
    output: &mut W,
) -> AppResult<PortOutcome> {
    let name = match &config.port {
        Some(name) => name.clone(),
        None => {
            let ports = list_ports()?;
            match ports.iter().find(|p| p.matches(config.usb_vid, config.usb_pid)) {
                Some(port) => {
                    info!(port = %port, "Found WolkSensor USB bridge");
                    port.name.clone()
                }
                None => match prompt_for_port(&ports, input, output)? {
                    Some(name) => name,
                    None => return Ok(PortOutcome::Quit),
                },
            }
        }
    };

    match SerialTransport::open(&name, config) {
        Ok(transport) => Ok(PortOutcome::Opened(transport)),
        Err(HarnessError::Serial(e)) => open_failure(name, e),
        Err(e) => Err(e),
    }
}

/// A port held by another program is worth a retry; a missing one is not.
fn open_failure(name: String, error: serialport::Error) -> AppResult<PortOutcome> {
    match error.kind() {
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            warn!(port = %name, error = %error, "Selected serial port is open in another program");
            Ok(PortOutcome::Busy(name))
        }
        serialport::ErrorKind::NoDevice => Err(HarnessError::PortUnavailable(format!("{} ({})", name, error))),
        _ => Err(HarnessError::Serial(error)),
    }
}

/// Asks the operator to pick a port. `None` means quit.
pub fn prompt_for_port<R: BufRead, W: Write>(
    ports: &[PortSummary],
    input: &mut R,
    output: &mut W,
) -> AppResult<Option<String>> {
    if ports.is_empty() {
        return Err(HarnessError::PortUnavailable("no serial ports found".to_string()));
    }

    writeln!(output, "Available serial ports:")?;
    for (i, port) in ports.iter().enumerate() {
        writeln!(output, "  {}: {}", i + 1, port)?;
    }

    loop {
        write!(output, "Select a port [1-{}] or q to quit: ", ports.len())?;
        output.flush()?;

        let mut choice = String::new();
        if input.read_line(&mut choice)? == 0 {
            return Ok(None);
        }
        let choice = choice.trim();
        if choice.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match choice.parse::<usize>() {
            Ok(i) if (1..=ports.len()).contains(&i) => return Ok(Some(ports[i - 1].name.clone())),
            _ => writeln!(output, "Invalid port selection '{}'", choice)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ports() -> Vec<PortSummary> {
        vec![
            PortSummary {
                name: "/dev/ttyS0".into(),
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
            PortSummary {
                name: "/dev/ttyUSB0".into(),
                vid: Some(0x0403),
                pid: Some(0x6015),
                manufacturer: Some("FTDI".into()),
                product: Some("FT231X USB UART".into()),
                serial_number: Some("DN01ABCD".into()),
            },
        ]
    }

    #[test]
    fn unplugged_port_is_unavailable_not_busy() {
        let gone = serialport::Error::new(serialport::ErrorKind::NoDevice, "No such device");
        let err = open_failure("/dev/ttyUSB0".into(), gone).err().unwrap();
        assert!(matches!(err, HarnessError::PortUnavailable(ref name) if name.starts_with("/dev/ttyUSB0")));

        let held = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "Permission denied",
        );
        assert!(matches!(
            open_failure("/dev/ttyUSB0".into(), held).unwrap(),
            PortOutcome::Busy(ref name) if name == "/dev/ttyUSB0"
        ));

        let other = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud rate");
        assert!(matches!(open_failure("/dev/ttyUSB0".into(), other), Err(HarnessError::Serial(_))));
    }

    #[test]
    fn prompt_selects_by_number() {
        let mut input = Cursor::new("7\n2\n");
        let mut output = Vec::new();
        let selected = prompt_for_port(&ports(), &mut input, &mut output).unwrap();
        assert_eq!(selected.as_deref(), Some("/dev/ttyUSB0"));

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Invalid port selection '7'"));
        assert!(shown.contains("[0403:6015]"));
    }

    #[test]
    fn prompt_quits() {
        let mut output = Vec::new();
        assert_eq!(prompt_for_port(&ports(), &mut Cursor::new("q\n"), &mut output).unwrap(), None);
        assert_eq!(prompt_for_port(&ports(), &mut Cursor::new(""), &mut output).unwrap(), None);
    }

    #[test]
    fn prompt_without_ports_is_an_error() {
        let mut output = Vec::new();
        let err = prompt_for_port(&[], &mut Cursor::new("1\n"), &mut output).unwrap_err();
        assert!(matches!(err, HarnessError::PortUnavailable(_)));
    }

    #[test]
    fn matches_vid_pid() {
        let ports = ports();
        assert!(!ports[0].matches(0x0403, 0x6015));
        assert!(ports[1].matches(0x0403, 0x6015));
    }
}
