//! The driver object: startup negotiation, capability extraction, the status
//! poll and the command/variable dispatch surface.

use crate::channel::Channel;
use crate::config::Config;
use crate::error::Result;
use crate::handshake::Handshake;
use crate::sink::StateSink;
use crate::status::{UpsStatus, parse_status, scan_float, scan_long};
use crate::tables::{CMDTAB, VARTAB, find_command, find_variable};
use crate::transport::Transport;

/// The literal reply acknowledging an accepted command.
const SUCCESS_REPLY: &[u8] = b"#0";

const STATUS_QUERY: &str = "D\r";
const BATTERY_RATINGS_QUERY: &str = "P3\r";
const POWER_RATINGS_QUERY: &str = "P2\r";
const INPUT_RATINGS_QUERY: &str = "P1\r";
/// Going by the `P<n>` pattern of the other queries these two likely exist as
/// well; nobody has reported what they answer yet, so their replies are only
/// logged.
const SPECULATIVE_QUERIES: &[&str] = &["P5\r", "P9\r"];
const CANCEL_SHUTDOWN: &str = "C\r";

/// Outcome of an instant command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdOutcome {
    /// The device acknowledged the command.
    Handled,
    /// The device answered, but not with the success marker.
    Failed,
    /// The name maps to nothing this device supports.
    Unknown,
}

/// Outcome of a variable set.
///
/// A rejected set reports the same outcome as an unknown variable; the two
/// have never been distinguishable through this protocol surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Handled,
    Unknown,
}

/// A PowerPanel text-protocol UPS behind some [`Transport`].
///
/// All shared protocol state lives here: the delays negotiated at startup and
/// the retained nameplate reply. Every operation is a strictly sequential
/// request/response exchange; nothing here is reentrant.
pub struct PowerPanel<T: Transport, const L: usize = 256> {
    channel: Channel<T, L>,
    /// Startup delay, minutes.
    ondelay: u32,
    /// Shutdown delay, seconds, quantized.
    offdelay: u32,
    /// Raw autodetect reply, reused by [`Self::init_info`].
    nameplate: String,
}

impl<T: Transport, const L: usize> PowerPanel<T, L> {
    pub fn new(transport: T) -> Self {
        Self {
            channel: Channel::new(transport),
            ondelay: 1,
            offdelay: 60,
            nameplate: String::new(),
        }
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    /// Negotiated startup delay in minutes.
    pub fn ondelay(&self) -> u32 {
        self.ondelay
    }

    /// Negotiated shutdown delay in seconds.
    pub fn offdelay(&self) -> u32 {
        self.offdelay
    }

    /// Run the protocol handshake and retain its results.
    ///
    /// Must succeed before anything else is useful; see [`Handshake::run`]
    /// for the failure modes.
    pub fn startup(&mut self, config: &impl Config) -> Result<(), T::Error> {
        let result = Handshake::new().run(&mut self.channel, config)?;
        self.ondelay = result.ondelay;
        self.offdelay = result.offdelay;
        self.nameplate = result.nameplate;
        Ok(())
    }

    /// One-time extraction of nameplate, ratings and variable ranges into the
    /// sink, plus command registration.
    ///
    /// Every query beyond the already-cached nameplate is optional: not all
    /// firmware answers all of them, and a missing rating merely leaves its
    /// fields unset.
    pub fn init_info(&mut self, sink: &mut impl StateSink) {
        sink.set_field("ups.delay.start", &(60 * self.ondelay).to_string());
        sink.set_field("ups.delay.shutdown", &self.offdelay.to_string());

        let nameplate = self.nameplate.clone();
        let mut fields = nameplate
            .strip_prefix('#')
            .unwrap_or(&nameplate)
            .split(',')
            .filter(|t| !t.is_empty());
        if let Some(model) = fields.next() {
            sink.set_field("ups.model", model.trim_end_matches(' '));
        }
        if let Some(firmware) = fields.next() {
            sink.set_field("ups.firmware", firmware);
        }
        if let Some(serial) = fields.next() {
            sink.set_field("ups.serial", serial);
        }
        if let Some(mfr) = fields.next() {
            sink.set_field("ups.mfr", mfr.trim_end_matches(' '));
        }

        // Battery ratings, e.g. `#12.0,002,008.0,00`.
        match self.channel.execute(BATTERY_RATINGS_QUERY) {
            Ok(reply) => {
                let mut tokens = reply_tokens(reply);
                if let Some(t) = tokens.next() {
                    sink.set_field("battery.voltage.nominal", &format!("{:.1}", scan_float(t)));
                }
                if let Some(t) = tokens.next() {
                    sink.set_field("battery.packs", &scan_long(t).to_string());
                }
                if let Some(t) = tokens.next() {
                    sink.set_field("battery.capacity", &format!("{:.1}", scan_float(t)));
                }
            }
            Err(e) => log::debug!("battery ratings query failed: {e}"),
        }

        // Power ratings, e.g. `#1200,0720,120,47,63`.
        match self.channel.execute(POWER_RATINGS_QUERY) {
            Ok(reply) => {
                let keys = [
                    "ups.power.nominal",
                    "ups.realpower.nominal",
                    "input.voltage.nominal",
                    "input.frequency.low",
                    "input.frequency.high",
                ];
                for (key, t) in keys.iter().zip(reply_tokens(reply)) {
                    sink.set_field(key, &scan_long(t).to_string());
                }
            }
            Err(e) => log::debug!("power ratings query failed: {e}"),
        }

        // Input ratings, e.g. `#120,139,088,20`. These seed the published
        // defaults the variable enumeration below keys off.
        match self.channel.execute(INPUT_RATINGS_QUERY) {
            Ok(reply) => {
                let keys = [
                    "input.voltage.nominal",
                    "input.transfer.high",
                    "input.transfer.low",
                    "battery.charge.low",
                ];
                for (key, t) in keys.iter().zip(reply_tokens(reply)) {
                    sink.set_field(key, &scan_long(t).to_string());
                }
            }
            Err(e) => log::debug!("input ratings query failed: {e}"),
        }

        for entry in CMDTAB {
            sink.register_command(entry.name);
        }

        for entry in VARTAB {
            if sink.get_field(entry.name).is_none() {
                continue;
            }
            let reply = match self.channel.execute(entry.get) {
                Ok(reply) => reply,
                Err(e) => {
                    log::debug!("range query for [{}] failed: {e}", entry.name);
                    continue;
                }
            };
            let mut tokens = reply_tokens(reply);
            if let Some(first) = tokens.next() {
                sink.mark_writable(entry.name);
                sink.add_enum_value(entry.name, &scan_long(first).to_string());
            }
            for t in tokens {
                sink.add_enum_value(entry.name, &scan_long(t).to_string());
            }
        }

        for query in SPECULATIVE_QUERIES {
            match self.channel.execute(query) {
                Ok(reply) => log::debug!(
                    "speculative query {:?} answered: {:02x?}",
                    query.trim_end(),
                    reply
                ),
                Err(e) => log::debug!("speculative query {:?}: {e}", query.trim_end()),
            }
        }

        // A shutdown timer armed in a previous session would still be
        // counting down; clear it regardless of the reply.
        let _ = self.channel.execute(CANCEL_SHUTDOWN);

        sink.register_command("shutdown.return");
        sink.register_command("shutdown.stayoff");
        sink.register_command("shutdown.reboot");
    }

    /// One poll cycle: query, decode, publish.
    ///
    /// On any failure nothing is published and the previously visible state
    /// stands. Returns whether the UPS is running on battery, which callers
    /// use to tighten their poll cadence.
    pub fn update_status(&mut self, sink: &mut impl StateSink) -> Result<bool, T::Error> {
        let status = {
            let reply = self.channel.execute(STATUS_QUERY)?;
            parse_status(reply)?
        };

        sink.set_field("input.voltage", &format!("{:.1}", status.input_voltage));
        sink.set_field("output.voltage", &format!("{:.1}", status.output_voltage));
        sink.set_field("ups.load", &status.load.to_string());
        sink.set_field("input.frequency", &format!("{:.1}", status.input_frequency));
        if let Some(temperature) = status.temperature {
            sink.set_field("ups.temperature", &temperature.to_string());
        }
        sink.set_field("battery.charge", &status.battery_charge.to_string());
        if let Some(b_volt) = status.battery_voltage {
            sink.set_field("battery.voltage", &format!("{:.1}", b_volt));
            // A reading in this band can only come from a 24 V pack.
            if b_volt > 20.0 && b_volt < 28.0 {
                sink.set_field("battery.voltage.nominal", "24.0");
            }
        }
        if let Some(o_freq) = status.output_frequency {
            sink.set_field("output.frequency", &format!("{:.1}", o_freq));
        }
        if let Some(runtime) = status.runtime {
            sink.set_field("battery.runtime", &(runtime * 60).to_string());
        }

        let tags = status.status_tags();
        sink.status_begin();
        for tag in &tags {
            sink.status_add(*tag);
        }
        sink.status_commit();

        Ok(tags.contains(&UpsStatus::OnBattery))
    }

    /// Dispatch an instant command by logical name.
    pub fn instcmd(&mut self, name: &str) -> CmdOutcome {
        if name.eq_ignore_ascii_case("beeper.off") {
            // Compatibility mode for the old command name.
            log::warn!("The 'beeper.off' command has been renamed to 'beeper.disable'");
            return self.instcmd("beeper.disable");
        }
        if name.eq_ignore_ascii_case("beeper.on") {
            log::warn!("The 'beeper.on' command has been renamed to 'beeper.enable'");
            return self.instcmd("beeper.enable");
        }

        if let Some(entry) = find_command(name) {
            return match entry.command {
                Some(command) => {
                    if self.command_ok(command) {
                        CmdOutcome::Handled
                    } else {
                        log::warn!("instant command [{name}] failed");
                        CmdOutcome::Failed
                    }
                }
                None => {
                    log::info!("instant command [{name}] not supported on this device");
                    CmdOutcome::Unknown
                }
            };
        }

        // The shutdown class embeds the negotiated delays, in whichever of
        // the two template shapes the delay's granularity calls for.
        let command = if name.eq_ignore_ascii_case("shutdown.return") {
            if self.offdelay < 60 {
                format!("Z.{}\r", self.offdelay / 6)
            } else {
                format!("Z{:02}\r", self.offdelay / 60)
            }
        } else if name.eq_ignore_ascii_case("shutdown.stayoff") {
            if self.offdelay < 60 {
                format!("S.{}\r", self.offdelay / 6)
            } else {
                format!("S{:02}\r", self.offdelay / 60)
            }
        } else if name.eq_ignore_ascii_case("shutdown.reboot") {
            if self.offdelay < 60 {
                format!("S.{}R{:04}\r", self.offdelay / 6, self.ondelay)
            } else {
                format!("S{:02}R{:04}\r", self.offdelay / 60, self.ondelay)
            }
        } else {
            log::info!("instant command [{name}] unknown");
            return CmdOutcome::Unknown;
        };

        if self.command_ok(&command) {
            CmdOutcome::Handled
        } else {
            log::warn!("instant command [{name}] failed");
            CmdOutcome::Failed
        }
    }

    /// Set a variable by logical name.
    ///
    /// Setting a variable to its already-published value succeeds without any
    /// device traffic.
    pub fn setvar(&mut self, name: &str, value: &str, sink: &mut impl StateSink) -> SetOutcome {
        let Some(entry) = find_variable(name) else {
            log::info!("variable [{name}] unknown");
            return SetOutcome::Unknown;
        };

        if let Some(current) = sink.get_field(entry.name) {
            if current.eq_ignore_ascii_case(value) {
                log::info!("[{value}] no change for variable [{name}]");
                return SetOutcome::Handled;
            }
        }

        let command = entry.set.render(scan_long(value.as_bytes()));
        if self.command_ok(&command) {
            sink.set_field(entry.name, value);
            return SetOutcome::Handled;
        }

        log::warn!("setting variable [{name}] to [{value}] failed");
        SetOutcome::Unknown
    }

    /// Send one command and check for the `#0` acknowledgement.
    fn command_ok(&mut self, command: &str) -> bool {
        match self.channel.execute(command) {
            Ok(reply) => reply == SUCCESS_REPLY,
            Err(e) => {
                log::debug!("command {:?} failed: {e}", command.trim_end());
                false
            }
        }
    }
}

/// Comma-separated tokens of a reply, with the framing byte skipped and empty
/// tokens dropped as the original tokenizer did.
fn reply_tokens(reply: &[u8]) -> impl Iterator<Item = &[u8]> {
    reply
        .get(1..)
        .unwrap_or(&[])
        .split(|b| *b == b',')
        .filter(|t| !t.is_empty())
}
