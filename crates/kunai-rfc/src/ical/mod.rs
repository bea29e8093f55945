//! iCalendar content-line layer (RFC 5545 §3.1): a raw component tree with
//! enough structure for normalization, component detection, and the
//! date-time extraction the recurrence expander needs.

mod build;
mod parse;
pub mod time;

pub use build::fold_line;
pub use parse::unfold;
pub(crate) use parse::parse_content_line;

use crate::error::{RfcError, RfcResult};

/// The calendar component kinds accepted as the primary child of
/// VCALENDAR.
pub const PRIMARY_COMPONENTS: [&str; 3] = ["VEVENT", "VTODO", "VJOURNAL"];

/// A single content line: `NAME;PARAM=VALUE:value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Uppercased property name.
    pub name: String,
    /// Parameters in document order; names uppercased, values unquoted.
    pub params: Vec<(String, String)>,
    /// The raw value text, unescaped exactly as received.
    pub value: String,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Returns the value of a named parameter, case-insensitively.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A component: BEGIN/END block with properties and nested components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Component>,
}

impl Component {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            ..Self::default()
        }
    }

    /// ## Summary
    /// Parses iCalendar text into the outermost component (normally
    /// VCALENDAR). Folded lines are unfolded first; bare LF payloads are
    /// accepted.
    ///
    /// ## Errors
    /// Returns [`RfcError::InvalidCalendarData`] for unbalanced BEGIN/END
    /// or text with no component at all.
    pub fn parse(input: &str) -> RfcResult<Self> {
        parse::parse_component(input)
    }

    /// Serializes with CRLF line endings and 75-octet folding.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        build::write_component(self, &mut out);
        out
    }

    /// First property with the given name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All properties with the given name.
    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> {
        self.properties.iter().filter(move |p| p.name == name)
    }

    /// First child component with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Component> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child components with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The first child whose name is one of the primary calendar
    /// component kinds; `None` for timezone-only or empty calendars.
    #[must_use]
    pub fn primary_component(&self) -> Option<&Component> {
        self.children
            .iter()
            .find(|c| PRIMARY_COMPONENTS.contains(&c.name.as_str()))
    }

    pub fn push_property(&mut self, property: Property) {
        self.properties.push(property);
    }
}

/// ## Summary
/// Normalizes an iCalendar payload by round-tripping it through
/// parse/serialize. The output always uses CRLF and canonical folding.
///
/// ## Errors
/// Propagates the parse failure for malformed payloads.
pub fn normalize(input: &str) -> RfcResult<String> {
    Ok(Component::parse(input)?.serialize())
}

/// ## Summary
/// Ensures every VEVENT in the raw payload carries a DTSTAMP, inserting
/// `DTSTAMP:<now UTC>` right after `BEGIN:VEVENT` where missing. The
/// payload's own newline style is preserved.
#[must_use]
pub fn ensure_dtstamp(body: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let newline = if body.contains("\r\n") { "\r\n" } else { "\n" };
    let stamp = format!("DTSTAMP:{}", time::format_utc_stamp(now));

    let lines: Vec<&str> = body.split(newline).collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        if line.trim_end().eq_ignore_ascii_case("BEGIN:VEVENT") {
            let mut has_dtstamp = false;
            for inner in &lines[i + 1..] {
                let trimmed = inner.trim_end();
                if trimmed.eq_ignore_ascii_case("END:VEVENT") {
                    break;
                }
                let upper = trimmed.to_ascii_uppercase();
                if upper.starts_with("DTSTAMP:") || upper.starts_with("DTSTAMP;") {
                    has_dtstamp = true;
                    break;
                }
            }
            if !has_dtstamp {
                out.push(stamp.clone());
            }
        }
        i += 1;
    }
    out.join(newline)
}

/// ## Summary
/// Validates that a payload is parseable VCALENDAR text and returns the
/// parsed tree together with the primary component name.
///
/// ## Errors
/// [`RfcError::InvalidCalendarData`] when the payload is not a VCALENDAR
/// or carries no primary component.
pub fn validate_calendar(input: &str) -> RfcResult<(Component, String)> {
    let root = Component::parse(input)?;
    if root.name != "VCALENDAR" {
        return Err(RfcError::InvalidCalendarData(format!(
            "expected VCALENDAR, got {}",
            root.name
        )));
    }
    let kind = root
        .primary_component()
        .map(|c| c.name.clone())
        .ok_or_else(|| {
            RfcError::InvalidCalendarData("no VEVENT, VTODO, or VJOURNAL component".to_string())
        })?;
    Ok((root, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:evt1\r\nDTSTAMP:20250101T090000Z\r\nDTSTART:20250101T100000Z\r\nDTEND:20250101T110000Z\r\nSUMMARY:Test\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn parse_and_access() {
        let cal = Component::parse(SAMPLE).expect("parses");
        assert_eq!(cal.name, "VCALENDAR");
        let event = cal.primary_component().expect("has VEVENT");
        assert_eq!(event.name, "VEVENT");
        assert_eq!(event.property("UID").expect("uid").value, "evt1");
        assert_eq!(event.property("SUMMARY").expect("summary").value, "Test");
    }

    #[test]
    fn normalize_is_stable() {
        let once = normalize(SAMPLE).expect("normalizes");
        let twice = normalize(&once).expect("normalizes again");
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_accepts_bare_lf() {
        let lf = SAMPLE.replace("\r\n", "\n");
        let normalized = normalize(&lf).expect("normalizes");
        assert!(normalized.contains("UID:evt1\r\n"));
    }

    #[test]
    fn params_are_parsed_and_unquoted() {
        let body = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:e\r\nDTSTART;TZID=\"Europe/Berlin\":20250101T100000\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let cal = Component::parse(body).expect("parses");
        let event = cal.primary_component().expect("event");
        let dtstart = event.property("DTSTART").expect("dtstart");
        assert_eq!(dtstart.param("TZID"), Some("Europe/Berlin"));
        assert_eq!(dtstart.value, "20250101T100000");
    }

    #[test]
    fn ensure_dtstamp_inserts_when_missing() {
        let body = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:e\nDTSTART:20250101T100000Z\nEND:VEVENT\nEND:VCALENDAR\n";
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("ts");
        let stamped = ensure_dtstamp(body, now);
        // newline style of the payload is preserved
        assert!(stamped.contains("BEGIN:VEVENT\nDTSTAMP:20250601T120000Z\n"));
        // already-stamped events are left alone
        let again = ensure_dtstamp(&stamped, now);
        assert_eq!(stamped, again);
    }

    #[test]
    fn validate_rejects_non_calendar_payloads() {
        assert!(validate_calendar("BEGIN:VCARD\r\nEND:VCARD\r\n").is_err());
        let timezone_only =
            "BEGIN:VCALENDAR\r\nBEGIN:VTIMEZONE\r\nTZID:UTC\r\nEND:VTIMEZONE\r\nEND:VCALENDAR\r\n";
        assert!(validate_calendar(timezone_only).is_err());
        let (_, kind) = validate_calendar(SAMPLE).expect("valid");
        assert_eq!(kind, "VEVENT");
    }
}
