//! The publication seam: where decoded device data ends up.
//!
//! The driver never renders state itself; it writes fields, variable metadata
//! and status tags into a [`StateSink`] owned by the caller.

use std::collections::{HashMap, HashSet};

use crate::status::UpsStatus;

/// Key/value store for published device state.
///
/// Status tags use a begin/add/commit transaction so a half-derived tag set is
/// never observable: `status_begin` opens a staging set, `status_add` fills
/// it, and `status_commit` replaces the visible set in one step.
pub trait StateSink {
    fn set_field(&mut self, key: &str, value: &str);
    fn get_field(&self, key: &str) -> Option<&str>;
    /// Mark a published field as writable through `setvar`.
    fn mark_writable(&mut self, key: &str);
    /// Append one legal value to a writable field's enumeration.
    fn add_enum_value(&mut self, key: &str, value: &str);
    /// Advertise an instant command.
    fn register_command(&mut self, name: &str);

    fn status_begin(&mut self);
    fn status_add(&mut self, tag: UpsStatus);
    fn status_commit(&mut self);
}

/// In-memory [`StateSink`].
///
/// Suitable for tests and for callers without a surrounding state store; the
/// accessors expose everything the driver published.
#[derive(Debug, Default)]
pub struct MemorySink {
    fields: HashMap<String, String>,
    writable: HashSet<String>,
    enums: HashMap<String, Vec<String>>,
    commands: Vec<String>,
    staged: Vec<UpsStatus>,
    committed: Vec<UpsStatus>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status tag set from the most recent transaction.
    pub fn status(&self) -> &[UpsStatus] {
        &self.committed
    }

    /// The committed status rendered as a space-separated word, e.g. `OL LB`.
    pub fn status_line(&self) -> String {
        self.committed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_writable(&self, key: &str) -> bool {
        self.writable.contains(key)
    }

    pub fn enum_values(&self, key: &str) -> &[String] {
        self.enums.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }
}

impl StateSink for MemorySink {
    fn set_field(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    fn get_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn mark_writable(&mut self, key: &str) {
        self.writable.insert(key.to_string());
    }

    fn add_enum_value(&mut self, key: &str, value: &str) {
        self.enums
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn register_command(&mut self, name: &str) {
        self.commands.push(name.to_string());
    }

    fn status_begin(&mut self) {
        self.staged.clear();
    }

    fn status_add(&mut self, tag: UpsStatus) {
        self.staged.push(tag);
    }

    fn status_commit(&mut self) {
        self.committed = core::mem::take(&mut self.staged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let mut sink = MemorySink::new();
        sink.set_field("ups.model", "CST135XLU");
        assert_eq!(sink.get_field("ups.model"), Some("CST135XLU"));
        assert_eq!(sink.get_field("ups.serial"), None);
    }

    #[test]
    fn status_transaction_is_atomic() {
        let mut sink = MemorySink::new();
        sink.status_begin();
        sink.status_add(UpsStatus::Online);
        sink.status_add(UpsStatus::LowBattery);
        // Nothing visible until commit.
        assert!(sink.status().is_empty());
        sink.status_commit();
        assert_eq!(sink.status(), &[UpsStatus::Online, UpsStatus::LowBattery]);
        assert_eq!(sink.status_line(), "OL LB");

        // A new transaction replaces, not appends.
        sink.status_begin();
        sink.status_add(UpsStatus::OnBattery);
        sink.status_commit();
        assert_eq!(sink.status(), &[UpsStatus::OnBattery]);
    }

    #[test]
    fn enum_values_accumulate() {
        let mut sink = MemorySink::new();
        sink.mark_writable("input.transfer.high");
        sink.add_enum_value("input.transfer.high", "139");
        sink.add_enum_value("input.transfer.high", "140");
        assert!(sink.is_writable("input.transfer.high"));
        assert_eq!(sink.enum_values("input.transfer.high"), ["139", "140"]);
        assert!(!sink.is_writable("input.transfer.low"));
    }
}
