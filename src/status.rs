//! Decoding of the periodic status reply and derivation of the discrete
//! operating-state tags.
//!
//! A status reply looks like `#I119.0O119.0L000B100T027F060.0S..`: a `#`
//! frame character, then letter-tagged value runs with no other separator.
//! Which tags appear varies by firmware; parsing must not assume a fixed
//! layout.

use modular_bitfield::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::channel::FRAME_CHAR;
use crate::error::ParseError;

/// One poll's worth of decoded electrical data.
///
/// Fields that only some firmware revisions report are `Option`s; `None`
/// means the tag was absent from the reply, not that the value was zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub input_voltage: f32,
    pub output_voltage: f32,
    /// Output load, percent.
    pub load: i32,
    /// Battery charge, percent.
    pub battery_charge: i32,
    pub input_frequency: f32,
    pub battery_voltage: Option<f32>,
    /// Unit temperature, degrees C.
    pub temperature: Option<i32>,
    pub output_frequency: Option<f32>,
    /// Runtime to empty, minutes.
    pub runtime: Option<i32>,
    /// Raw device status bytes from the `S` field, copied verbatim. May
    /// contain non-printable bytes.
    pub flags: [u8; 2],
}

/// First raw status byte, bit-mapped.
///
/// Only three bits have a confirmed meaning; the rest vary by model and are
/// ignored. A byte value of zero (all bits clear) additionally means the
/// output is switched off, which is checked on the raw byte.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct StatusWord {
    #[skip]
    __: B3,
    /// 0x08: a battery self-test is running.
    pub test_in_progress: bool,
    #[skip]
    __: B1,
    /// 0x20: battery is low.
    pub battery_low: bool,
    /// 0x40: running from battery; clear means running from the mains.
    pub on_battery: bool,
    #[skip]
    __: B1,
}

/// Discrete operating-state tags, serialized in the conventional UPS
/// status-word spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum UpsStatus {
    #[strum(serialize = "OL")]
    Online,
    #[strum(serialize = "OB")]
    OnBattery,
    #[strum(serialize = "LB")]
    LowBattery,
    #[strum(serialize = "TRIM")]
    Trimming,
    #[strum(serialize = "BOOST")]
    Boosting,
    #[strum(serialize = "TEST")]
    SelfTest,
    #[strum(serialize = "OFF")]
    Off,
}

impl StatusSnapshot {
    /// Derive the full set of state tags for this snapshot.
    ///
    /// `Online`/`OnBattery` are mutually exclusive; everything else is
    /// additive. The trim/boost judgement is only meaningful while the output
    /// is fed from the mains, so it is skipped whenever the on-battery or
    /// self-test bits are set. Comparisons multiply the input voltage rather
    /// than divide, so a zero input voltage cannot fault.
    pub fn status_tags(&self) -> Vec<UpsStatus> {
        let word = StatusWord::from_bytes([self.flags[0]]);
        let mut tags = Vec::new();

        if word.on_battery() {
            tags.push(UpsStatus::OnBattery);
        } else {
            tags.push(UpsStatus::Online);
        }

        if word.battery_low() {
            tags.push(UpsStatus::LowBattery);
        }

        if !word.on_battery() && !word.test_in_progress() {
            let i_volt = self.input_voltage;
            let o_volt = self.output_voltage;

            if o_volt < 0.5 * i_volt {
                log::debug!("output voltage too low ({o_volt:.1} V vs {i_volt:.1} V in)");
            } else if o_volt < 0.95 * i_volt {
                tags.push(UpsStatus::Trimming);
            } else if o_volt < 1.05 * i_volt {
                // Normal regulation band.
            } else if o_volt < 1.5 * i_volt {
                tags.push(UpsStatus::Boosting);
            } else {
                log::debug!("output voltage too high ({o_volt:.1} V vs {i_volt:.1} V in)");
            }
        }

        if word.test_in_progress() {
            tags.push(UpsStatus::SelfTest);
        }

        if self.flags[0] == 0 {
            tags.push(UpsStatus::Off);
        }

        tags
    }
}

/// Iterator over the `<letter><value-bytes>` runs of a status reply body.
///
/// Every ASCII letter both terminates the previous run and starts the next
/// one; anything before the first letter is discarded. This layer knows
/// nothing about what the tags mean.
pub struct FieldRuns<'a> {
    rest: &'a [u8],
}

impl<'a> FieldRuns<'a> {
    /// `body` is the reply with the leading frame character already removed.
    pub fn new(body: &'a [u8]) -> Self {
        Self { rest: body }
    }
}

impl<'a> Iterator for FieldRuns<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.iter().position(|b| b.is_ascii_alphabetic())?;
        let tag = self.rest[start];
        let value_start = start + 1;
        let end = self.rest[value_start..]
            .iter()
            .position(|b| b.is_ascii_alphabetic())
            .map(|p| value_start + p)
            .unwrap_or(self.rest.len());
        let value = &self.rest[value_start..end];
        self.rest = &self.rest[end..];
        Some((tag, value))
    }
}

/// Decode one status reply line into a snapshot.
///
/// Unknown tags are tolerated (newer firmware adds fields freely) but do not
/// count towards validity; a reply with fewer than three recognised fields is
/// rejected rather than published.
pub fn parse_status(line: &[u8]) -> Result<StatusSnapshot, ParseError> {
    let first = *line.first().ok_or(ParseError::Framing(0))?;
    if first != FRAME_CHAR {
        return Err(ParseError::Framing(first));
    }

    let mut snapshot = StatusSnapshot::default();
    let mut valid = 0usize;
    let mut seen_input_freq = false;

    for (mut tag, value) in FieldRuns::new(&line[1..]) {
        // Depending on device/firmware, the output frequency is coded as
        // either an H, HF, or a second F field.
        if tag == b'F' && seen_input_freq {
            tag = b'H';
        }

        match tag {
            b'I' => snapshot.input_voltage = scan_float(value),
            b'O' => snapshot.output_voltage = scan_float(value),
            b'L' => snapshot.load = scan_long(value) as i32,
            b'B' => snapshot.battery_charge = scan_long(value) as i32,
            b'V' => snapshot.battery_voltage = Some(scan_float(value)),
            b'T' => snapshot.temperature = Some(scan_long(value) as i32),
            b'F' => {
                snapshot.input_frequency = scan_float(value);
                seen_input_freq = true;
            }
            b'H' => snapshot.output_frequency = Some(scan_float(value)),
            b'R' => snapshot.runtime = Some(scan_long(value) as i32),
            b'S' => {
                for (i, b) in value.iter().take(2).enumerate() {
                    snapshot.flags[i] = *b;
                }
            }
            other => {
                log::debug!("unrecognised status field '{}'", other as char);
                continue;
            }
        }
        valid += 1;
    }

    if valid < 3 {
        return Err(ParseError::InsufficientFields(valid));
    }

    Ok(snapshot)
}

/// Leading-prefix integer conversion with `strtol` semantics: junk and empty
/// input yield zero rather than an error. Device firmware pads and truncates
/// these fields inconsistently.
pub(crate) fn scan_long(value: &[u8]) -> i64 {
    let mut end = 0;
    if matches!(value.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < value.len() && value[end].is_ascii_digit() {
        end += 1;
    }
    core::str::from_utf8(&value[..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Leading-prefix float conversion with `strtof` semantics; see [`scan_long`].
pub(crate) fn scan_float(value: &[u8]) -> f32 {
    let mut end = 0;
    if matches!(value.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < value.len() && value[end].is_ascii_digit() {
        end += 1;
    }
    if value.get(end) == Some(&b'.') {
        end += 1;
        while end < value.len() && value[end].is_ascii_digit() {
            end += 1;
        }
    }
    core::str::from_utf8(&value[..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}
