//! Persisted entity types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Address books whose URI starts with this prefix are directory-backed
/// and read-only.
pub const DIRECTORY_BOOK_PREFIX: &str = "ldap_";

/// Calendar component kinds a collection can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Event,
    Todo,
    Journal,
}

impl ComponentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VEVENT" => Some(Self::Event),
            "VTODO" => Some(Self::Todo),
            "VJOURNAL" => Some(Self::Journal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    pub id: Uuid,
    pub owner_uid: String,
    pub uri: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Current change sequence; the CTag/sync-token is `seq:<ctag>`.
    pub ctag: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarObject {
    pub calendar_id: Uuid,
    pub uid: String,
    pub component: ComponentKind,
    /// Normalized iCalendar text.
    pub data: String,
    /// Unquoted strong validator; quoted at the HTTP boundary.
    pub etag: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a calendar object upsert; the store assigns ETag, timestamps,
/// and the change sequence.
#[derive(Debug, Clone)]
pub struct CalendarObjectUpsert {
    pub calendar_id: Uuid,
    pub uid: String,
    pub component: ComponentKind,
    pub data: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressbook {
    pub id: Uuid,
    pub owner_uid: String,
    pub uri: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub ctag: i64,
    pub updated_at: DateTime<Utc>,
}

impl Addressbook {
    /// Directory-backed books are read-only.
    #[must_use]
    pub fn is_directory_backed(&self) -> bool {
        self.uri.starts_with(DIRECTORY_BOOK_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub addressbook_id: Uuid,
    pub uid: String,
    /// Normalized vCard text.
    pub data: String,
    pub etag: String,
    pub updated_at: DateTime<Utc>,
}

/// One change-log entry. `(seq, uid)` pairs are the truth for sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection_id: Uuid,
    pub seq: i64,
    pub uid: String,
    pub deleted: bool,
    pub at: DateTime<Utc>,
}

/// A page of changes together with the collection's current sequence.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub changes: Vec<Change>,
    pub current_seq: i64,
    /// True when the page was cut short by the caller's limit.
    pub truncated: bool,
}

/// Collection sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStatus {
    Pending,
    Processed,
}

/// An iTIP message parked in a user's scheduling inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingObject {
    pub owner_uid: String,
    pub uid: String,
    pub data: String,
    pub method: String,
    pub originator: String,
    pub recipient: String,
    pub status: SchedulingStatus,
    pub received_at: DateTime<Utc>,
}

/// A recorded METHOD:REPLY, keyed by event UID and attendee email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeResponse {
    pub event_uid: String,
    pub attendee_email: String,
    pub part_stat: String,
    pub responded_at: DateTime<Utc>,
}

/// A cached free-busy aggregation for one user and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyCacheEntry {
    pub user_uid: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    /// Serialized VFREEBUSY body.
    pub data: String,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_kind_round_trip() {
        for kind in [ComponentKind::Event, ComponentKind::Todo, ComponentKind::Journal] {
            assert_eq!(ComponentKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ComponentKind::from_name("VFREEBUSY"), None);
    }

    #[test]
    fn directory_backed_books() {
        let book = Addressbook {
            id: Uuid::new_v4(),
            owner_uid: "alice".to_string(),
            uri: "ldap_staff".to_string(),
            display_name: None,
            description: None,
            ctag: 0,
            updated_at: Utc::now(),
        };
        assert!(book.is_directory_backed());
    }
}
