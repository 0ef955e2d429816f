//! The command channel: one command out, one reply line back.
//!
//! This is the sole I/O boundary of the driver. It knows nothing about what a
//! command means; retry policy is left entirely to callers.

use std::time::Duration;

use embedded_io::Error as _;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Every command and reply is terminated by a carriage return.
pub const ENDCHAR: u8 = b'\r';
/// Reply framing character.
pub const FRAME_CHAR: u8 = b'#';

/// Bytes dropped while reading a reply line.
const IGNCHARS: &[u8] = b"";
const SEND_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(3);
/// Turnaround pause between send and read. The UPS needs a moment before it
/// starts answering; without this, replies to fast back-to-back commands get
/// truncated.
const REPLY_DELAY: Duration = Duration::from_millis(100);

/// A request/response exchange over an exclusively owned transport.
///
/// `L` bounds the reply line; the protocol never produces lines anywhere near
/// 256 bytes, and nothing beyond the one line is ever buffered.
pub struct Channel<T: Transport, const L: usize = 256> {
    transport: T,
    answer: heapless::Vec<u8, L>,
}

impl<T: Transport, const L: usize> Channel<T, L> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            answer: heapless::Vec::new(),
        }
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Reconfigure the transport's line speed.
    pub fn configure(&mut self, baud: u32) -> Result<(), T::Error> {
        self.transport.configure(baud).map_err(Error::Serial)
    }

    /// Send `command` verbatim and read exactly one reply line.
    ///
    /// Stale input is discarded first: the device may still be emitting the
    /// tail of an earlier reply that timed out. On success the returned slice
    /// is the raw line including its leading framing character, with the
    /// terminator stripped.
    pub fn execute(&mut self, command: &str) -> Result<&[u8], T::Error> {
        // Failure to flush is not worth failing the exchange over.
        let _ = self.transport.flush_input();

        let sent = match self.transport.send(command.as_bytes(), SEND_TIMEOUT) {
            Ok(n) => n,
            Err(e) if e.kind() == embedded_io::ErrorKind::TimedOut => {
                return Err(Error::SendTimeout);
            }
            Err(e) => return Err(Error::SendError(e)),
        };
        if sent < command.len() {
            return Err(Error::SendTimeout);
        }
        log::debug!("send: {:02x?}", command.as_bytes());

        std::thread::sleep(REPLY_DELAY);

        self.answer.clear();
        // Capacity is exactly L, so this cannot fail.
        let _ = self.answer.resize(L, 0);
        let n = match
            self.transport
                .read_line(&mut self.answer, ENDCHAR, IGNCHARS, READ_TIMEOUT)
        {
            Ok(n) => n,
            Err(e) if e.kind() == embedded_io::ErrorKind::TimedOut => {
                self.answer.clear();
                return Err(Error::ReadTimeout);
            }
            Err(e) => {
                self.answer.clear();
                return Err(Error::ReadError(e));
            }
        };
        self.answer.truncate(n);
        if n == 0 {
            return Err(Error::ReadTimeout);
        }
        log::debug!("read: {:02x?}", &self.answer[..]);

        Ok(&self.answer)
    }
}
