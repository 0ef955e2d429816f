//! The declarative protocol surface: which logical names map onto which device
//! command strings.
//!
//! Dispatch walks these tables instead of branching per name, so the surface
//! stays data and can be tested on its own.

/// One instant command the driver advertises.
pub struct CommandEntry {
    /// Logical command name, unique within the table.
    pub name: &'static str,
    /// Device command string. `None` marks a name that is advertised for
    /// compatibility but has no wire form of its own.
    pub command: Option<&'static str>,
}

/// Instant commands with a fixed wire form.
///
/// The three shutdown-class commands are not listed here; their command strings
/// embed the negotiated delays and are synthesized at dispatch time.
pub const CMDTAB: &[CommandEntry] = &[
    CommandEntry { name: "test.battery.start.quick", command: Some("T\r") },
    CommandEntry { name: "test.battery.start.deep", command: Some("TL\r") },
    CommandEntry { name: "test.battery.stop", command: Some("CT\r") },
    CommandEntry { name: "beeper.enable", command: Some("C7:1\r") },
    CommandEntry { name: "beeper.disable", command: Some("C7:0\r") },
    CommandEntry { name: "beeper.on", command: None },
    CommandEntry { name: "beeper.off", command: None },
    CommandEntry { name: "shutdown.stop", command: Some("C\r") },
];

/// Zero-padded integer set-command template, standing in for the original
/// firmware's `C2:%03d\r` style format strings.
pub struct SetTemplate {
    pub prefix: &'static str,
    pub width: usize,
}

impl SetTemplate {
    /// Render the template for one integer value.
    pub fn render(&self, value: i64) -> String {
        format!("{}{:0w$}\r", self.prefix, value, w = self.width)
    }
}

/// One settable variable: a query command plus a set-command template.
pub struct VariableEntry {
    /// Logical variable name, unique within the table.
    pub name: &'static str,
    /// Query command returning the current value and its legal enumeration.
    pub get: &'static str,
    pub set: SetTemplate,
}

pub const VARTAB: &[VariableEntry] = &[
    VariableEntry {
        name: "input.transfer.high",
        get: "P6\r",
        set: SetTemplate { prefix: "C2:", width: 3 },
    },
    VariableEntry {
        name: "input.transfer.low",
        get: "P7\r",
        set: SetTemplate { prefix: "C3:", width: 3 },
    },
    VariableEntry {
        name: "battery.charge.low",
        get: "P8\r",
        set: SetTemplate { prefix: "C4:", width: 2 },
    },
];

/// Look up an instant command by name. Matching is case-insensitive, as the
/// original protocol handler accepted either case.
pub fn find_command(name: &str) -> Option<&'static CommandEntry> {
    CMDTAB.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Look up a settable variable by name, case-insensitively.
pub fn find_variable(name: &str) -> Option<&'static VariableEntry> {
    VARTAB.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lookup_is_case_insensitive() {
        assert!(find_command("TEST.BATTERY.STOP").is_some());
        assert!(find_command("test.battery.stop").is_some());
        assert!(find_command("no.such.command").is_none());
    }

    #[test]
    fn legacy_beeper_names_have_no_wire_form() {
        assert!(find_command("beeper.on").unwrap().command.is_none());
        assert!(find_command("beeper.off").unwrap().command.is_none());
    }

    #[test]
    fn set_templates_zero_pad() {
        let high = find_variable("input.transfer.high").unwrap();
        assert_eq!(high.set.render(139), "C2:139\r");
        assert_eq!(high.set.render(88), "C2:088\r");

        let low_charge = find_variable("battery.charge.low").unwrap();
        assert_eq!(low_charge.set.render(8), "C4:08\r");
    }
}
