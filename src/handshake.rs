//! Startup negotiation: confirm the device speaks the text protocol and pin
//! down the shutdown/startup delays every later shutdown command will embed.

use crate::channel::{Channel, FRAME_CHAR};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::status::scan_long;
use crate::transport::Transport;

/// The text protocol always runs at 2400 baud.
pub const PROTOCOL_BAUD: u32 = 2400;

/// Autodetect query; the reply doubles as the nameplate line.
const PROBE: &str = "P4\r";
/// A qualifying probe reply carries at least the model, firmware, serial and
/// manufacturer fields, which never fit in fewer bytes than this.
const MIN_PROBE_REPLY: usize = 46;
const MAX_TRIES: usize = 3;

const ONDELAY_DEFAULT: i64 = 1; // minutes
const OFFDELAY_DEFAULT: i64 = 60; // seconds

/// Where the negotiation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    SpeedConfigured,
    ProbeSent,
    Retrying,
    Confirmed,
    Failed,
}

/// Everything the handshake establishes, computed once.
///
/// Later operations use these by value; nothing re-derives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Raw qualifying probe reply, kept so capability extraction does not
    /// have to ask the same question again.
    pub nameplate: String,
    /// Startup delay, minutes.
    pub ondelay: u32,
    /// Shutdown delay, seconds, already quantized to what the device can be
    /// told: multiples of 6 below one minute, whole minutes at or above.
    pub offdelay: u32,
}

pub struct Handshake {
    state: HandshakeState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::NotStarted,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the negotiation to completion.
    ///
    /// Configured delays are validated before a single byte goes out: an
    /// out-of-range delay is an operator mistake the process must not paper
    /// over, while a silent device is merely [`Error::Unsupported`] and left
    /// to the caller's judgement.
    pub fn run<T: Transport, const L: usize>(
        &mut self,
        channel: &mut Channel<T, L>,
        config: &impl Config,
    ) -> Result<HandshakeResult, T::Error> {
        let ondelay = delay_from_config(config, "ondelay", ONDELAY_DEFAULT, 0, 9999)?;
        let offdelay = delay_from_config(config, "offdelay", OFFDELAY_DEFAULT, 6, 600)?;
        let offdelay = quantize_offdelay(offdelay as u32);
        let ondelay = ondelay as u32;

        log::debug!("trying text protocol");
        channel.configure(PROTOCOL_BAUD)?;
        self.state = HandshakeState::SpeedConfigured;

        // Wake the device up. Many models do not answer this at all, so the
        // outcome is deliberately ignored.
        let _ = channel.execute("\r\r");

        for attempt in 1..=MAX_TRIES {
            self.state = HandshakeState::ProbeSent;
            match channel.execute(PROBE) {
                Ok(reply) if reply.len() >= MIN_PROBE_REPLY && reply.first() == Some(&FRAME_CHAR) => {
                    self.state = HandshakeState::Confirmed;
                    let nameplate = String::from_utf8_lossy(reply).into_owned();
                    log::debug!("text protocol confirmed on attempt {attempt}");
                    return Ok(HandshakeResult {
                        nameplate,
                        ondelay,
                        offdelay,
                    });
                }
                Ok(reply) => {
                    log::debug!(
                        "probe attempt {attempt}: unqualifying reply ({} bytes)",
                        reply.len()
                    );
                }
                Err(e) => {
                    log::debug!("probe attempt {attempt}: {e}");
                }
            }
            self.state = HandshakeState::Retrying;
        }

        self.state = HandshakeState::Failed;
        Err(Error::Unsupported)
    }
}

fn delay_from_config<I: embedded_io::Error>(
    config: &impl Config,
    name: &'static str,
    default: i64,
    min: i64,
    max: i64,
) -> core::result::Result<i64, Error<I>> {
    let value = match config.get(name) {
        Some(raw) => scan_long(raw.as_bytes()),
        None => default,
    };
    if value < min || value > max {
        return Err(Error::DelayOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Truncate to the nearest delay the device can actually be set to.
fn quantize_offdelay(offdelay: u32) -> u32 {
    if offdelay < 60 {
        offdelay - (offdelay % 6)
    } else {
        offdelay - (offdelay % 60)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::mock_serial::{MockError, MockTransport};

    /// Long enough and `#`-framed, so it qualifies.
    const NAMEPLATE: &[u8] = b"#CST135XLU,BF01403AAH2,CR7EV2002320,CyberPower Systems Inc.,,,";

    fn config(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn channel(mock: MockTransport) -> Channel<MockTransport, 256> {
        Channel::new(mock)
    }

    #[test]
    fn confirms_on_first_qualifying_reply() {
        let mut mock = MockTransport::new();
        // No answer to the wakeup, then a qualifying probe reply.
        mock.queue_error(MockError::Timeout);
        mock.queue_reply(NAMEPLATE);
        let mut ch = channel(mock);

        let mut hs = Handshake::new();
        let result = hs.run(&mut ch, &()).unwrap();

        assert_eq!(hs.state(), HandshakeState::Confirmed);
        assert_eq!(result.ondelay, 1);
        assert_eq!(result.offdelay, 60);
        assert_eq!(result.nameplate.as_bytes(), NAMEPLATE);
        assert_eq!(ch.transport().written_data(), b"\r\rP4\r");
        assert_eq!(ch.transport().baud(), Some(PROTOCOL_BAUD));
    }

    #[test]
    fn retries_short_and_failed_probes() {
        let mut mock = MockTransport::new();
        mock.queue_error(MockError::Timeout); // wakeup
        mock.queue_reply(b"#SHORT"); // too short
        mock.queue_error(MockError::Timeout); // no reply
        mock.queue_reply(NAMEPLATE); // third time lucky
        let mut ch = channel(mock);

        let mut hs = Handshake::new();
        let result = hs.run(&mut ch, &()).unwrap();
        assert_eq!(hs.state(), HandshakeState::Confirmed);
        assert_eq!(result.nameplate.as_bytes(), NAMEPLATE);
        assert_eq!(ch.transport().written_data(), b"\r\rP4\rP4\rP4\r");
    }

    #[test]
    fn rejects_reply_without_frame_character() {
        let mut mock = MockTransport::new();
        mock.queue_error(MockError::Timeout); // wakeup
        // Long enough but not framed; all three attempts fail.
        mock.queue_reply(&NAMEPLATE[1..]);
        mock.queue_reply(&NAMEPLATE[1..]);
        mock.queue_reply(&NAMEPLATE[1..]);
        let mut ch = channel(mock);

        let mut hs = Handshake::new();
        assert!(matches!(hs.run(&mut ch, &()), Err(Error::Unsupported)));
        assert_eq!(hs.state(), HandshakeState::Failed);
    }

    #[test]
    fn gives_up_after_retry_ceiling() {
        let mut ch = channel(MockTransport::new());
        let mut hs = Handshake::new();
        assert!(matches!(hs.run(&mut ch, &()), Err(Error::Unsupported)));
        assert_eq!(hs.state(), HandshakeState::Failed);
        // Wakeup plus exactly three probes, no more.
        assert_eq!(ch.transport().written_data(), b"\r\rP4\rP4\rP4\r");
    }

    #[test]
    fn reads_and_quantizes_configured_delays() {
        let mut mock = MockTransport::new();
        mock.queue_error(MockError::Timeout);
        mock.queue_reply(NAMEPLATE);
        let mut ch = channel(mock);

        let cfg = config(&[("ondelay", "5"), ("offdelay", "45")]);
        let result = Handshake::new().run(&mut ch, &cfg).unwrap();
        assert_eq!(result.ondelay, 5);
        // 45 s truncates to the next lower multiple of 6.
        assert_eq!(result.offdelay, 42);

        let mut mock = MockTransport::new();
        mock.queue_error(MockError::Timeout);
        mock.queue_reply(NAMEPLATE);
        let mut ch = channel(mock);

        let cfg = config(&[("offdelay", "90")]);
        let result = Handshake::new().run(&mut ch, &cfg).unwrap();
        // At or above one minute the resolution is whole minutes.
        assert_eq!(result.offdelay, 60);
    }

    #[test]
    fn out_of_range_delays_fail_before_any_traffic() {
        for (key, value) in [
            ("ondelay", "10000"),
            ("ondelay", "-1"),
            ("offdelay", "5"),
            ("offdelay", "601"),
        ] {
            let mut ch = channel(MockTransport::new());
            let cfg = config(&[(key, value)]);
            let err = Handshake::new().run(&mut ch, &cfg).unwrap_err();
            assert!(matches!(err, Error::DelayOutOfRange { .. }), "{key}={value}");
            // Nothing may have reached the device.
            assert!(ch.transport().written_data().is_empty());
            assert_eq!(ch.transport().baud(), None);
        }
    }

    #[test]
    fn range_endpoints_are_legal() {
        for (key, value, field) in [
            ("ondelay", "0", 0u32),
            ("ondelay", "9999", 9999),
            ("offdelay", "6", 6),
            ("offdelay", "600", 600),
        ] {
            let mut mock = MockTransport::new();
            mock.queue_error(MockError::Timeout);
            mock.queue_reply(NAMEPLATE);
            let mut ch = channel(mock);
            let cfg = config(&[(key, value)]);
            let result = Handshake::new().run(&mut ch, &cfg).unwrap();
            if key == "ondelay" {
                assert_eq!(result.ondelay, field);
            } else {
                assert_eq!(result.offdelay, field);
            }
        }
    }
}
