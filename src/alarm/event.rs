//! Alarm event value type: five fixed-capacity text fields, immutable once
//! built.

use serde::Serialize;

/// Byte capacity of the originating-process slot.
pub const PROCESS_CAP: usize = 20;
/// Byte capacity of the source slot.
pub const SOURCE_CAP: usize = 12;
/// Byte capacity of the alarm-code slot.
pub const CODE_CAP: usize = 12;
/// Byte capacity of the payload slot.
pub const PAYLOAD_CAP: usize = 80;
/// Byte capacity of the originating-node slot.
pub const NODE_CAP: usize = 12;

/// One alarm event.
///
/// Fields are clamped at construction: NUL bytes are stripped (zero is the
/// wire pad/terminator, so field text can never forge padding) and overlong
/// text is silently right-truncated to the slot capacity on a UTF-8
/// character boundary. Truncation never fails and is part of the contract;
/// callers that care must pre-measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmEvent {
    process: String,
    source: String,
    code: String,
    payload: String,
    node: String,
}

impl AlarmEvent {
    /// Build an event, clamping every field to its slot capacity.
    #[must_use]
    pub fn new(
        process: impl Into<String>,
        source: impl Into<String>,
        code: impl Into<String>,
        payload: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            process: clamp(process.into(), PROCESS_CAP),
            source: clamp(source.into(), SOURCE_CAP),
            code: clamp(code.into(), CODE_CAP),
            payload: clamp(payload.into(), PAYLOAD_CAP),
            node: clamp(node.into(), NODE_CAP),
        }
    }

    #[must_use]
    pub fn process(&self) -> &str {
        &self.process
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }
}

/// Node/process identity stamped into every event this process emits.
#[derive(Debug, Clone)]
pub struct EventOrigin {
    node: String,
    process: String,
}

impl EventOrigin {
    #[must_use]
    pub fn new(node: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            process: process.into(),
        }
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[must_use]
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Build an event carrying this origin.
    #[must_use]
    pub fn event(
        &self,
        source: impl Into<String>,
        code: impl Into<String>,
        payload: impl Into<String>,
    ) -> AlarmEvent {
        AlarmEvent::new(
            self.process.clone(),
            source,
            code,
            payload,
            self.node.clone(),
        )
    }
}

fn clamp(mut value: String, cap: usize) -> String {
    if value.as_bytes().contains(&0) {
        value.retain(|ch| ch != '\0');
    }
    if value.len() > cap {
        let mut end = cap;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{AlarmEvent, CODE_CAP, PAYLOAD_CAP};

    #[test]
    fn short_fields_pass_through() {
        let event = AlarmEvent::new("acqd", "portmon", "MonPortFail", "port 16001 down", "dc1-n1");
        assert_eq!(event.process(), "acqd");
        assert_eq!(event.source(), "portmon");
        assert_eq!(event.code(), "MonPortFail");
        assert_eq!(event.payload(), "port 16001 down");
        assert_eq!(event.node(), "dc1-n1");
    }

    #[test]
    fn overlong_payload_keeps_first_eighty_bytes() {
        let long = "x".repeat(100);
        let event = AlarmEvent::new("p", "s", "c", long.clone(), "n");
        assert_eq!(event.payload(), &long[..PAYLOAD_CAP]);
    }

    #[test]
    fn truncation_backs_off_to_a_char_boundary() {
        // "a" then six two-byte "é": byte 12 falls mid-character, so the cut
        // must back off to 11 bytes instead of splitting the sixth "é".
        let code = format!("a{}", "é".repeat(6));
        let event = AlarmEvent::new("p", "s", code, "", "n");
        assert!(event.code().len() < CODE_CAP);
        assert_eq!(event.code(), format!("a{}", "é".repeat(5)));
    }

    #[test]
    fn nul_bytes_are_stripped_before_truncation() {
        let event = AlarmEvent::new("p", "s\0neak", "c", "pay\0load", "n");
        assert_eq!(event.source(), "sneak");
        assert_eq!(event.payload(), "payload");
    }

    #[test]
    fn empty_fields_stay_empty() {
        let event = AlarmEvent::new("", "", "", "", "");
        assert_eq!(event.source(), "");
        assert_eq!(event.node(), "");
    }
}
