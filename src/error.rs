//! Our error types for the PowerPanel text protocol.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for PowerPanel UPS communications.
///
/// Generic over the transport's own error type so callers keep access to the
/// underlying failure.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    /// The command could not be written within the transport's deadline.
    #[error("Send timed out")]
    SendTimeout,
    /// The transport failed while writing the command.
    #[error("Send failed: {0:?}")]
    SendError(I),
    /// No full reply line arrived within the transport's deadline.
    #[error("Read timed out")]
    ReadTimeout,
    /// The transport failed while reading the reply.
    #[error("Read failed: {0:?}")]
    ReadError(I),
    /// The transport failed while being reconfigured.
    #[error("Serial line error: {0:?}")]
    Serial(I),
    /// A status reply could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A configured delay is outside the range the device accepts. Fatal; the
    /// driver must not proceed.
    #[error("{name} delay '{value}' out of range [{min}..{max}]")]
    DelayOutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    /// The device never produced a qualifying autodetect reply.
    #[error("UPS does not speak the text protocol")]
    Unsupported,
}

/// Errors produced while decoding a status reply line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The reply did not begin with the `#` framing character.
    #[error("Expected start character '#', but got 0x{0:02x}")]
    Framing(u8),
    /// Fewer than three recognised fields were decoded.
    #[error("Status reply contained only {0} recognised fields")]
    InsufficientFields(usize),
}
