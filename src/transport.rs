//! The serial transport seam the driver talks through.

use std::time::Duration;

/// A byte transport carrying the UPS serial line.
///
/// The driver only ever needs four operations, so this is deliberately narrower
/// than a full serial port API. Implementations enforce the supplied deadlines
/// themselves and surface a timeout as an error whose
/// [`kind`](embedded_io::Error::kind) is [`embedded_io::ErrorKind::TimedOut`];
/// the channel uses that classification to tell a slow device from a broken
/// line.
pub trait Transport {
    type Error: embedded_io::Error;

    /// Reconfigure the line speed.
    fn configure(&mut self, baud: u32) -> Result<(), Self::Error>;

    /// Discard any unread input bytes.
    ///
    /// The device may have produced output after a previous read gave up on it,
    /// and those stale bytes would otherwise be taken for the next reply.
    fn flush_input(&mut self) -> Result<(), Self::Error>;

    /// Write the whole buffer, bounded by `timeout`. Returns the number of
    /// bytes written; a short count means the write did not complete.
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, Self::Error>;

    /// Read one line into `buf`, up to but not including `terminator`, skipping
    /// any byte listed in `ignore`, bounded by `timeout`. Returns the line
    /// length.
    fn read_line(
        &mut self,
        buf: &mut [u8],
        terminator: u8,
        ignore: &[u8],
        timeout: Duration,
    ) -> Result<usize, Self::Error>;
}
