/// Path segment constants shared across crates.
pub const CALENDARS_COMPONENT: &str = "calendars";
pub const ADDRESSBOOKS_COMPONENT: &str = "addressbooks";
pub const PRINCIPALS_COMPONENT: &str = "principals";
pub const PRINCIPAL_USERS_COMPONENT: &str = "users";
pub const SHARED_COMPONENT: &str = "shared";
pub const INBOX_COMPONENT: &str = "inbox";
pub const OUTBOX_COMPONENT: &str = "outbox";

/// Default base prefix when none is configured.
pub const DEFAULT_BASE_PREFIX: &str = "/dav";

/// Well-known discovery paths (RFC 6764).
pub const WELL_KNOWN_CALDAV: &str = "/.well-known/caldav";
pub const WELL_KNOWN_CARDDAV: &str = "/.well-known/carddav";

/// Address books whose URI starts with this prefix are directory-backed
/// and read-only.
pub const DIRECTORY_BOOK_PREFIX: &str = "ldap_";

/// Object filename suffixes.
pub const ICS_SUFFIX: &str = ".ics";
pub const VCF_SUFFIX: &str = ".vcf";

/// Media types.
pub const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
pub const VCARD_CONTENT_TYPE: &str = "text/vcard; charset=utf-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
