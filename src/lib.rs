//! This crate implements the text variant of the CyberPower "PowerPanel" serial
//! protocol, as spoken by a range of CyberPower UPS hardware.
//!
//! Commands are short ASCII strings terminated by a carriage return; replies are
//! single lines framed by a leading `#`. The crate covers protocol autodetection,
//! nameplate/capability extraction, the periodic status poll and the instant
//! command / settable variable surface.
//!
//! Example UPS models which this should work with:
//! * BC1200
//! * CST135XLU
//! * OP1000E
//! * Value 600E
//!
//! The crate is generic over a [`transport::Transport`], so it can drive a real
//! serial port or a test double alike. The serial port used for UPS comms should
//! be configured like so:
//! * Baud rate: 2400 (the handshake requests this via the transport)
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

pub mod channel;
pub mod config;
pub mod error;
pub mod handshake;
pub mod sink;
pub mod status;
pub mod tables;
pub mod transport;
pub mod ups;

#[cfg(test)]
mod mock_serial;
