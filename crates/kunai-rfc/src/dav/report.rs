//! REPORT request models (RFC 4791 §7, RFC 6352 §8, RFC 6578 §3).

use chrono::{DateTime, Utc};

use super::namespace::QName;

/// A `C:time-range` / free-busy window. Open ends are permitted in
/// calendar-query filters; free-busy-query requires both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Text match behaviour for addressbook-query prop filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

/// `CR:text-match` inside a prop-filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub value: String,
    pub collation: String,
    pub negate: bool,
    pub match_type: MatchType,
}

/// `CR:param-filter`: parsed, matched by parameter presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFilter {
    pub name: String,
    pub is_not_defined: bool,
}

/// `CR:prop-filter` on a vCard property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub text_match: Option<TextMatch>,
    pub param_filters: Vec<ParamFilter>,
}

/// `calendar-query`: requested properties plus the distilled filter — the
/// leaf component names and the innermost time-range.
#[derive(Debug, Clone, Default)]
pub struct CalendarQuery {
    pub properties: Vec<QName>,
    pub components: Vec<String>,
    pub time_range: Option<TimeRange>,
}

/// `addressbook-query`.
#[derive(Debug, Clone, Default)]
pub struct AddressbookQuery {
    pub properties: Vec<QName>,
    pub prop_filters: Vec<PropFilter>,
    /// True = anyof (default per RFC 6352), false = allof.
    pub any_of: bool,
    pub limit: Option<u32>,
}

/// `calendar-multiget` / `addressbook-multiget`.
#[derive(Debug, Clone, Default)]
pub struct Multiget {
    pub properties: Vec<QName>,
    pub hrefs: Vec<String>,
}

/// `D:sync-collection`.
#[derive(Debug, Clone, Default)]
pub struct SyncCollection {
    pub sync_token: String,
    pub limit: Option<u32>,
    pub properties: Vec<QName>,
}

/// A parsed REPORT request, dispatched on the root element.
#[derive(Debug, Clone)]
pub enum ReportRequest {
    CalendarQuery(CalendarQuery),
    CalendarMultiget(Multiget),
    AddressbookQuery(AddressbookQuery),
    AddressbookMultiget(Multiget),
    SyncCollection(SyncCollection),
    FreeBusyQuery(TimeRange),
}
