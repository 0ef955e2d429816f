//! We use this mocking module in unit tests to emulate the serial line to the
//! UPS: scripted replies in, captured command bytes out.

use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Timeout,
    Simulated,
}

impl core::fmt::Display for MockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockError::Timeout => write!(f, "timeout"),
            MockError::Simulated => write!(f, "simulated"),
        }
    }
}

impl core::error::Error for MockError {}

impl embedded_io::Error for MockError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockError::Simulated => embedded_io::ErrorKind::Other,
        }
    }
}

/// Scripted [`Transport`].
///
/// Each read consumes the next queued outcome; an empty queue behaves like a
/// silent device and times out. Replies are queued already line-framed, so the
/// terminator and ignore arguments go unused here.
#[derive(Debug, Default)]
pub struct MockTransport {
    written: Vec<u8>,
    replies: VecDeque<Result<Vec<u8>, MockError>>,
    baud: Option<u32>,
    flushes: usize,
    send_failure: Option<MockError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&mut self, line: &[u8]) {
        self.replies.push_back(Ok(line.to_vec()));
    }

    pub fn queue_error(&mut self, error: MockError) {
        self.replies.push_back(Err(error));
    }

    /// Make every subsequent send fail with `error`.
    pub fn fail_send(&mut self, error: MockError) {
        self.send_failure = Some(error);
    }

    /// Everything written so far, in order.
    pub fn written_data(&self) -> &[u8] {
        &self.written
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    pub fn baud(&self) -> Option<u32> {
        self.baud
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    fn configure(&mut self, baud: u32) -> Result<(), MockError> {
        self.baud = Some(baud);
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), MockError> {
        self.flushes += 1;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, MockError> {
        if let Some(error) = self.send_failure {
            return Err(error);
        }
        self.written.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn read_line(
        &mut self,
        buf: &mut [u8],
        _terminator: u8,
        _ignore: &[u8],
        _timeout: Duration,
    ) -> Result<usize, MockError> {
        match self.replies.pop_front() {
            Some(Ok(line)) => {
                let n = line.len().min(buf.len());
                buf[..n].copy_from_slice(&line[..n]);
                Ok(n)
            }
            Some(Err(error)) => Err(error),
            None => Err(MockError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_writes_in_order() {
        let mut mock = MockTransport::new();
        mock.send(b"P4\r", Duration::from_secs(1)).unwrap();
        mock.send(b"D\r", Duration::from_secs(1)).unwrap();
        assert_eq!(mock.written_data(), b"P4\rD\r");
    }

    #[test]
    fn replays_script_then_times_out() {
        let mut mock = MockTransport::new();
        mock.queue_reply(b"#0");
        mock.queue_error(MockError::Simulated);

        let mut buf = [0u8; 16];
        let n = mock
            .read_line(&mut buf, b'\r', b"", Duration::from_secs(1))
            .unwrap();
        assert_eq!(&buf[..n], b"#0");
        assert_eq!(
            mock.read_line(&mut buf, b'\r', b"", Duration::from_secs(1)),
            Err(MockError::Simulated)
        );
        assert_eq!(
            mock.read_line(&mut buf, b'\r', b"", Duration::from_secs(1)),
            Err(MockError::Timeout)
        );
    }
}
