//! DAV URL-space routing.
//!
//! ## Summary
//! Parses request paths (and `DAV:href` values, which may be full URLs)
//! against the configured base prefix into a [`DavPath`]. The URL space is
//! a calendar/address-book home hierarchy with a synthetic `shared/` mount
//! plus per-user scheduling collections:
//!
//! - `calendars/{owner}/` — calendar home
//! - `calendars/{owner}/{cal}/` and `calendars/{owner}/{cal}/{uid}.ics`
//! - `calendars/{owner}/shared/{cal}/...` — shared mount, `{cal}` resolves
//!   by URI across all owners
//! - `calendars/{owner}/inbox/`, `calendars/{owner}/outbox/`
//! - `addressbooks/{owner}/...` mirror with `.vcf` objects
//! - `principals/users/{uid}` — principal resource

use crate::constants::{
    ADDRESSBOOKS_COMPONENT, CALENDARS_COMPONENT, ICS_SUFFIX, INBOX_COMPONENT, OUTBOX_COMPONENT,
    PRINCIPALS_COMPONENT, PRINCIPAL_USERS_COMPONENT, SHARED_COMPONENT, VCF_SUFFIX,
};
use crate::error::{CoreError, CoreResult};

/// Which protocol family a collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Calendar,
    Addressbook,
}

impl ResourceKind {
    #[must_use]
    pub fn home_component(self) -> &'static str {
        match self {
            Self::Calendar => CALENDARS_COMPONENT,
            Self::Addressbook => ADDRESSBOOKS_COMPONENT,
        }
    }

    #[must_use]
    pub fn object_suffix(self) -> &'static str {
        match self {
            Self::Calendar => ICS_SUFFIX,
            Self::Addressbook => VCF_SUFFIX,
        }
    }
}

/// Scheduling collection flavour under a calendar home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingBox {
    Inbox,
    Outbox,
}

impl SchedulingBox {
    #[must_use]
    pub fn component(self) -> &'static str {
        match self {
            Self::Inbox => INBOX_COMPONENT,
            Self::Outbox => OUTBOX_COMPONENT,
        }
    }
}

/// A collection reference as it appears in the URL space.
///
/// `owner` is the home the URL was addressed under; for `shared` mounts the
/// actual owner of the collection is found by resolving `uri` across all
/// owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub kind: ResourceKind,
    pub owner: String,
    pub uri: String,
    pub shared: bool,
}

/// A fully routed DAV path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavPath {
    /// The base prefix root.
    Root,
    /// `principals/users/{uid}`.
    Principal { uid: String },
    /// `calendars/{owner}/` or `addressbooks/{owner}/`.
    Home { kind: ResourceKind, owner: String },
    /// An owned or shared-mounted collection.
    Collection(CollectionRef),
    /// An object inside a collection; `uid` has its `.ics`/`.vcf` suffix
    /// stripped.
    Object { collection: CollectionRef, uid: String },
    /// `calendars/{owner}/inbox/` or `.../outbox/`.
    Scheduling { owner: String, bin: SchedulingBox },
    /// An object inside a scheduling inbox.
    SchedulingObject { owner: String, bin: SchedulingBox, uid: String },
}

/// Returns true when a path segment must be rejected outright: empty,
/// containing `/`, `\`, `..`, or ASCII control characters.
#[must_use]
pub fn is_unsafe_segment(segment: &str) -> bool {
    segment.is_empty()
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains("..")
        || segment.bytes().any(|b| b.is_ascii_control())
}

/// Collection names are held to a stricter standard than generic segments:
/// any non-printable character is banned as well.
#[must_use]
pub fn is_valid_collection_name(name: &str) -> bool {
    !is_unsafe_segment(name) && !name.chars().any(char::is_control)
}

/// Strips scheme and authority from a full-URL href, leaving the path.
fn strip_authority(href: &str) -> &str {
    if let Some(rest) = href.find("://").map(|i| &href[i + 3..]) {
        rest.find('/').map_or("/", |i| &rest[i..])
    } else {
        href
    }
}

/// ## Summary
/// Parses a request path or href into a [`DavPath`].
///
/// Full URLs are accepted by stripping scheme and authority. The
/// configured base prefix is stripped next; a path outside the prefix is
/// an error.
///
/// ## Errors
/// [`CoreError::InvalidPath`] for structurally unrecognized paths,
/// [`CoreError::UnsafeSegment`] for segments failing the safety check.
pub fn parse(base_prefix: &str, raw: &str) -> CoreResult<DavPath> {
    let path = strip_authority(raw);

    let rest = path
        .strip_prefix(base_prefix)
        .ok_or_else(|| CoreError::InvalidPath(raw.to_string()))?;
    let rest = rest.trim_start_matches('/').trim_end_matches('/');

    if rest.is_empty() {
        return Ok(DavPath::Root);
    }

    let segments: Vec<&str> = rest.split('/').collect();
    for seg in &segments {
        if is_unsafe_segment(seg) {
            return Err(CoreError::UnsafeSegment((*seg).to_string()));
        }
    }

    match segments.as_slice() {
        [PRINCIPALS_COMPONENT, PRINCIPAL_USERS_COMPONENT, uid] => Ok(DavPath::Principal {
            uid: (*uid).to_string(),
        }),
        [root, owner, tail @ ..] => {
            let kind = match *root {
                CALENDARS_COMPONENT => ResourceKind::Calendar,
                ADDRESSBOOKS_COMPONENT => ResourceKind::Addressbook,
                _ => return Err(CoreError::InvalidPath(raw.to_string())),
            };
            parse_home_tail(kind, owner, tail, raw)
        }
        _ => Err(CoreError::InvalidPath(raw.to_string())),
    }
}

fn parse_home_tail(
    kind: ResourceKind,
    owner: &str,
    tail: &[&str],
    raw: &str,
) -> CoreResult<DavPath> {
    let owner = owner.to_string();
    match tail {
        [] => Ok(DavPath::Home { kind, owner }),
        [bin @ (INBOX_COMPONENT | OUTBOX_COMPONENT), rest @ ..]
            if kind == ResourceKind::Calendar =>
        {
            let bin = if *bin == INBOX_COMPONENT {
                SchedulingBox::Inbox
            } else {
                SchedulingBox::Outbox
            };
            match rest {
                [] => Ok(DavPath::Scheduling { owner, bin }),
                [uid] => Ok(DavPath::SchedulingObject {
                    owner,
                    bin,
                    uid: strip_object_suffix(uid, kind).to_string(),
                }),
                _ => Err(CoreError::InvalidPath(raw.to_string())),
            }
        }
        [SHARED_COMPONENT, rest @ ..] => parse_collection_tail(kind, owner, true, rest, raw),
        rest => parse_collection_tail(kind, owner, false, rest, raw),
    }
}

fn parse_collection_tail(
    kind: ResourceKind,
    owner: String,
    shared: bool,
    tail: &[&str],
    raw: &str,
) -> CoreResult<DavPath> {
    match tail {
        [uri] => {
            require_collection_name(uri)?;
            Ok(DavPath::Collection(CollectionRef {
                kind,
                owner,
                uri: (*uri).to_string(),
                shared,
            }))
        }
        [uri, object] => {
            require_collection_name(uri)?;
            Ok(DavPath::Object {
                collection: CollectionRef {
                    kind,
                    owner,
                    uri: (*uri).to_string(),
                    shared,
                },
                uid: strip_object_suffix(object, kind).to_string(),
            })
        }
        _ => Err(CoreError::InvalidPath(raw.to_string())),
    }
}

fn require_collection_name(name: &str) -> CoreResult<()> {
    if is_valid_collection_name(name) {
        Ok(())
    } else {
        Err(CoreError::UnsafeSegment(name.to_string()))
    }
}

fn strip_object_suffix(object: &str, kind: ResourceKind) -> &str {
    object.strip_suffix(kind.object_suffix()).unwrap_or(object)
}

/// ## Summary
/// Splits a recurrence-instance identifier into `(master_uid, recurrence)`.
///
/// An instance id has the shape `<UID>-<YYYYMMDDTHHMMSSZ>`. The suffix is
/// recognized only when it is exactly 16 bytes with byte 9 `T` and byte 16
/// `Z`; anything else is treated as a plain master UID.
#[must_use]
pub fn split_instance_uid(uid: &str) -> Option<(&str, &str)> {
    if uid.len() < 18 {
        return None;
    }
    let (master, dash_suffix) = uid.split_at(uid.len() - 17);
    let rec = dash_suffix.strip_prefix('-')?;
    let bytes = rec.as_bytes();
    if bytes.len() == 16 && bytes[8] == b'T' && bytes[15] == b'Z' {
        Some((master, rec))
    } else {
        None
    }
}

/// Href builders used by the property emitter and REPORT responses. All of
/// them produce collection hrefs with a trailing slash, matching what
/// clients echo back in multiget hrefs.
pub mod href {
    use super::{CollectionRef, ResourceKind, SchedulingBox};
    use crate::constants::{PRINCIPALS_COMPONENT, PRINCIPAL_USERS_COMPONENT, SHARED_COMPONENT};

    #[must_use]
    pub fn principal(prefix: &str, uid: &str) -> String {
        format!("{prefix}/{PRINCIPALS_COMPONENT}/{PRINCIPAL_USERS_COMPONENT}/{uid}")
    }

    #[must_use]
    pub fn home(prefix: &str, kind: ResourceKind, owner: &str) -> String {
        format!("{prefix}/{}/{owner}/", kind.home_component())
    }

    #[must_use]
    pub fn collection(prefix: &str, c: &CollectionRef) -> String {
        if c.shared {
            format!(
                "{prefix}/{}/{}/{SHARED_COMPONENT}/{}/",
                c.kind.home_component(),
                c.owner,
                c.uri
            )
        } else {
            format!("{prefix}/{}/{}/{}/", c.kind.home_component(), c.owner, c.uri)
        }
    }

    #[must_use]
    pub fn object(prefix: &str, c: &CollectionRef, uid: &str) -> String {
        format!("{}{uid}{}", collection(prefix, c), c.kind.object_suffix())
    }

    #[must_use]
    pub fn scheduling(prefix: &str, owner: &str, bin: SchedulingBox) -> String {
        format!(
            "{prefix}/{}/{owner}/{}/",
            ResourceKind::Calendar.home_component(),
            bin.component()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(owner: &str, uri: &str, shared: bool) -> CollectionRef {
        CollectionRef {
            kind: ResourceKind::Calendar,
            owner: owner.to_string(),
            uri: uri.to_string(),
            shared,
        }
    }

    #[test]
    fn parses_calendar_home() {
        let parsed = parse("/dav", "/dav/calendars/alice/").expect("home parses");
        assert_eq!(
            parsed,
            DavPath::Home {
                kind: ResourceKind::Calendar,
                owner: "alice".to_string()
            }
        );
    }

    #[test]
    fn parses_owned_collection_and_object() {
        assert_eq!(
            parse("/dav", "/dav/calendars/alice/work/").expect("collection"),
            DavPath::Collection(cal("alice", "work", false))
        );
        assert_eq!(
            parse("/dav", "/dav/calendars/alice/work/evt1.ics").expect("object"),
            DavPath::Object {
                collection: cal("alice", "work", false),
                uid: "evt1".to_string()
            }
        );
    }

    #[test]
    fn parses_shared_mount() {
        assert_eq!(
            parse("/dav", "/dav/calendars/alice/shared/team/evt1.ics").expect("shared object"),
            DavPath::Object {
                collection: cal("alice", "team", true),
                uid: "evt1".to_string()
            }
        );
    }

    #[test]
    fn shared_and_owned_round_trip_same_collection() {
        // Path round-trip: the shared variant resolves the same
        // (owner, collection, uid) triple within the shared branch.
        let owned = parse("/dav", "/dav/calendars/u1/c1/").expect("owned");
        let shared = parse("/dav", "/dav/calendars/u1/shared/c1/e.ics").expect("shared");
        let DavPath::Collection(owned) = owned else {
            panic!("expected collection");
        };
        let DavPath::Object { collection, uid } = shared else {
            panic!("expected object");
        };
        assert_eq!(owned.owner, collection.owner);
        assert_eq!(owned.uri, collection.uri);
        assert_eq!(uid, "e");
        assert!(collection.shared);
    }

    #[test]
    fn parses_scheduling_collections() {
        assert_eq!(
            parse("/dav", "/dav/calendars/bob/inbox/").expect("inbox"),
            DavPath::Scheduling {
                owner: "bob".to_string(),
                bin: SchedulingBox::Inbox
            }
        );
        assert_eq!(
            parse("/dav", "/dav/calendars/bob/outbox/").expect("outbox"),
            DavPath::Scheduling {
                owner: "bob".to_string(),
                bin: SchedulingBox::Outbox
            }
        );
        assert_eq!(
            parse("/dav", "/dav/calendars/bob/inbox/msg1.ics").expect("inbox object"),
            DavPath::SchedulingObject {
                owner: "bob".to_string(),
                bin: SchedulingBox::Inbox,
                uid: "msg1".to_string()
            }
        );
    }

    #[test]
    fn addressbooks_mirror_with_vcf() {
        assert_eq!(
            parse("/dav", "/dav/addressbooks/alice/friends/card1.vcf").expect("contact"),
            DavPath::Object {
                collection: CollectionRef {
                    kind: ResourceKind::Addressbook,
                    owner: "alice".to_string(),
                    uri: "friends".to_string(),
                    shared: false,
                },
                uid: "card1".to_string()
            }
        );
        // inbox/outbox only exist under calendar homes
        assert_eq!(
            parse("/dav", "/dav/addressbooks/alice/inbox/").expect("plain collection"),
            DavPath::Collection(CollectionRef {
                kind: ResourceKind::Addressbook,
                owner: "alice".to_string(),
                uri: "inbox".to_string(),
                shared: false,
            })
        );
    }

    #[test]
    fn parses_principal() {
        assert_eq!(
            parse("/dav", "/dav/principals/users/alice").expect("principal"),
            DavPath::Principal {
                uid: "alice".to_string()
            }
        );
    }

    #[test]
    fn accepts_full_url_hrefs() {
        let parsed =
            parse("/dav", "https://cal.example.com/dav/calendars/alice/work/").expect("full url");
        assert_eq!(parsed, DavPath::Collection(cal("alice", "work", false)));
    }

    #[test]
    fn rejects_unsafe_segments() {
        assert!(parse("/dav", "/dav/calendars/../etc/passwd").is_err());
        assert!(parse("/dav", "/dav/calendars/a\\b/x/").is_err());
        assert!(parse("/dav", "/dav/calendars/alice/a\u{7}b/").is_err());
        assert!(parse("/dav", "/other/calendars/alice/").is_err());
    }

    #[test]
    fn instance_uid_suffix_shape() {
        assert_eq!(
            split_instance_uid("evt1-20250101T100000Z"),
            Some(("evt1", "20250101T100000Z"))
        );
        // byte 9 must be T and byte 16 Z
        assert_eq!(split_instance_uid("evt1-20250101X100000Z"), None);
        assert_eq!(split_instance_uid("evt1-20250101T100000X"), None);
        // master UIDs never carry the suffix
        assert_eq!(split_instance_uid("evt1"), None);
        assert_eq!(split_instance_uid("20250101T100000Z"), None);
    }

    #[test]
    fn href_builders_round_trip_through_parse() {
        let c = cal("alice", "team", true);
        let href = href::object("/dav", &c, "evt1-20250101T100000Z");
        assert_eq!(href, "/dav/calendars/alice/shared/team/evt1-20250101T100000Z.ics");
        let parsed = parse("/dav", &href).expect("href parses back");
        assert_eq!(
            parsed,
            DavPath::Object {
                collection: c,
                uid: "evt1-20250101T100000Z".to_string()
            }
        );
    }
}
