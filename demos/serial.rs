use std::env;
use std::time::{Duration, Instant};

use powerpanel_txt::sink::MemorySink;
use powerpanel_txt::transport::Transport;
use powerpanel_txt::ups::PowerPanel;
use serialport::SerialPort;

const POLL_INTERVAL_MS: u64 = 2000;
const POLL_COUNT: usize = 5;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl Transport for PortWrapper {
    type Error = IoError;

    fn configure(&mut self, baud: u32) -> Result<(), IoError> {
        self.0.set_baud_rate(baud).map_err(|e| IoError(e.into()))
    }

    fn flush_input(&mut self) -> Result<(), IoError> {
        self.0
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| IoError(e.into()))
    }

    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, IoError> {
        self.0.set_timeout(timeout).map_err(|e| IoError(e.into()))?;
        std::io::Write::write(&mut self.0, bytes).map_err(IoError)
    }

    fn read_line(
        &mut self,
        buf: &mut [u8],
        terminator: u8,
        ignore: &[u8],
        timeout: Duration,
    ) -> Result<usize, IoError> {
        let deadline = Instant::now() + timeout;
        let mut len = 0;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| IoError(std::io::ErrorKind::TimedOut.into()))?;
            self.0
                .set_timeout(remaining)
                .map_err(|e| IoError(e.into()))?;

            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.0, &mut byte) {
                Ok(0) => continue,
                Ok(_) => {
                    if byte[0] == terminator {
                        return Ok(len);
                    }
                    if ignore.contains(&byte[0]) {
                        continue;
                    }
                    if len < buf.len() {
                        buf[len] = byte[0];
                        len += 1;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError(e)),
            }
        }
    }
}

fn main() {
    env_logger::init();

    // Get serial port from command line arg, or list what is available
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");
        if ports.is_empty() {
            eprintln!("No serial ports found!");
        } else {
            eprintln!("Usage: serial <port>, where <port> is one of:");
            for p in ports {
                eprintln!("  {}", p.port_name);
            }
        }
        std::process::exit(1);
    });

    println!("Using port: {}", port_name);

    // The baud rate is reconfigured during startup; 8N1 is the builder's
    // default framing, which is what the UPS speaks.
    let port = serialport::new(&port_name, 2400)
        .timeout(Duration::from_secs(3))
        .open()
        .expect("Failed to open serial port");

    let mut ups: PowerPanel<PortWrapper, 256> = PowerPanel::new(PortWrapper(port));

    // Probe the device; delays could be overridden here with a HashMap config
    ups.startup(&()).expect("No PowerPanel text protocol UPS detected");
    println!(
        "UPS detected (ondelay {} min, offdelay {} s)",
        ups.ondelay(),
        ups.offdelay()
    );

    // One-time capability extraction
    let mut sink = MemorySink::new();
    ups.init_info(&mut sink);

    println!("\n--- Device Information ---");
    let mut fields: Vec<_> = sink.fields().iter().collect();
    fields.sort();
    for (key, value) in fields {
        println!("{}: {}", key, value);
    }

    println!("\n--- Supported Commands ---");
    for command in sink.commands() {
        println!("{}", command);
    }

    // Poll the status a few times
    println!("\n--- Status ---");
    for _ in 0..POLL_COUNT {
        match ups.update_status(&mut sink) {
            Ok(on_battery) => {
                println!(
                    "status: [{}]  load {}%  charge {}%{}",
                    sink.status_line(),
                    sink.fields().get("ups.load").map(String::as_str).unwrap_or("?"),
                    sink.fields()
                        .get("battery.charge")
                        .map(String::as_str)
                        .unwrap_or("?"),
                    if on_battery { "  (on battery!)" } else { "" }
                );
            }
            Err(e) => eprintln!("status poll failed: {}", e),
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}
