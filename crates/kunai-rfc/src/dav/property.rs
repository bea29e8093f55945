//! DAV property values as they appear inside `<D:prop>`.

use super::namespace::QName;

/// A WebDAV privilege as advertised in ACLs and
/// `current-user-privilege-set` (RFC 3744 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    All,
    Read,
    Write,
    WriteProperties,
    WriteContent,
    Bind,
    Unbind,
    Unlock,
    ReadAcl,
    ReadCurrentUserPrivilegeSet,
    /// `CALDAV:read-free-busy`; the only non-`DAV:` privilege emitted.
    ReadFreeBusy,
}

impl Privilege {
    #[must_use]
    pub fn qname(self) -> QName {
        match self {
            Self::All => QName::dav("all"),
            Self::Read => QName::dav("read"),
            Self::Write => QName::dav("write"),
            Self::WriteProperties => QName::dav("write-properties"),
            Self::WriteContent => QName::dav("write-content"),
            Self::Bind => QName::dav("bind"),
            Self::Unbind => QName::dav("unbind"),
            Self::Unlock => QName::dav("unlock"),
            Self::ReadAcl => QName::dav("read-acl"),
            Self::ReadCurrentUserPrivilegeSet => QName::dav("read-current-user-privilege-set"),
            Self::ReadFreeBusy => QName::caldav("read-free-busy"),
        }
    }
}

/// The principal an ACE applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcePrincipal {
    Href(String),
    Authenticated,
    All,
}

/// One access control entry inside `DAV:acl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub principal: AcePrincipal,
    pub grant: Vec<Privilege>,
    pub protected: bool,
}

impl Ace {
    /// The owner ACE: `DAV:all`, protected.
    #[must_use]
    pub fn owner(principal_href: impl Into<String>) -> Self {
        Self {
            principal: AcePrincipal::Href(principal_href.into()),
            grant: vec![Privilege::All],
            protected: true,
        }
    }
}

/// A property value, shaped for XML emission.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Text(String),
    Href(String),
    HrefSet(Vec<String>),
    Integer(i64),
    /// `DAV:resourcetype` children.
    ResourceType(Vec<QName>),
    /// `DAV:supported-report-set` report names.
    SupportedReports(Vec<QName>),
    /// `C:supported-calendar-component-set` comp names.
    SupportedComponents(Vec<String>),
    /// `C:supported-collation-set` collation identifiers.
    SupportedCollations(Vec<String>),
    /// `C:supported-calendar-data` / `CR:supported-address-data`
    /// (content-type, version) pairs.
    DataTypes(Vec<(String, String)>),
    /// Raw calendar/vcard payload inside `C:calendar-data` /
    /// `CR:address-data`.
    ContentData(String),
    /// `DAV:current-user-privilege-set`.
    Privileges(Vec<Privilege>),
    /// `DAV:acl`.
    Acl(Vec<Ace>),
    Empty,
}

/// A DAV property with name and optional value; `None` means the property
/// was requested but is not defined on the resource (404 propstat group).
#[derive(Debug, Clone)]
pub struct DavProperty {
    pub name: QName,
    pub value: Option<PropertyValue>,
}

impl DavProperty {
    /// Creates a property with no value (for 404 responses).
    #[must_use]
    pub fn not_found(name: QName) -> Self {
        Self { name, value: None }
    }

    #[must_use]
    pub fn text(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Text(value.into())),
        }
    }

    #[must_use]
    pub fn href(name: QName, href: impl Into<String>) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Href(href.into())),
        }
    }

    #[must_use]
    pub fn integer(name: QName, value: i64) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Integer(value)),
        }
    }

    #[must_use]
    pub fn empty(name: QName) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Empty),
        }
    }

    #[must_use]
    pub fn with_value(name: QName, value: PropertyValue) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }
}

/// Common DAV property names.
pub mod dav_props {
    use super::QName;

    pub fn resourcetype() -> QName {
        QName::dav("resourcetype")
    }
    pub fn displayname() -> QName {
        QName::dav("displayname")
    }
    pub fn getcontenttype() -> QName {
        QName::dav("getcontenttype")
    }
    pub fn getlastmodified() -> QName {
        QName::dav("getlastmodified")
    }
    pub fn getetag() -> QName {
        QName::dav("getetag")
    }
    pub fn owner() -> QName {
        QName::dav("owner")
    }
    pub fn current_user_principal() -> QName {
        QName::dav("current-user-principal")
    }
    pub fn principal_url() -> QName {
        QName::dav("principal-URL")
    }
    pub fn supported_report_set() -> QName {
        QName::dav("supported-report-set")
    }
    pub fn sync_token() -> QName {
        QName::dav("sync-token")
    }
    pub fn acl() -> QName {
        QName::dav("acl")
    }
    pub fn current_user_privilege_set() -> QName {
        QName::dav("current-user-privilege-set")
    }
}

/// Common `CalDAV` property names.
pub mod caldav_props {
    use super::QName;

    pub fn calendar_home_set() -> QName {
        QName::caldav("calendar-home-set")
    }
    pub fn calendar_description() -> QName {
        QName::caldav("calendar-description")
    }
    pub fn calendar_timezone() -> QName {
        QName::caldav("calendar-timezone")
    }
    pub fn supported_calendar_component_set() -> QName {
        QName::caldav("supported-calendar-component-set")
    }
    pub fn supported_calendar_data() -> QName {
        QName::caldav("supported-calendar-data")
    }
    pub fn supported_collation_set() -> QName {
        QName::caldav("supported-collation-set")
    }
    pub fn max_resource_size() -> QName {
        QName::caldav("max-resource-size")
    }
    pub fn min_date_time() -> QName {
        QName::caldav("min-date-time")
    }
    pub fn max_date_time() -> QName {
        QName::caldav("max-date-time")
    }
    pub fn max_instances() -> QName {
        QName::caldav("max-instances")
    }
    pub fn max_attendees_per_instance() -> QName {
        QName::caldav("max-attendees-per-instance")
    }
    pub fn calendar_data() -> QName {
        QName::caldav("calendar-data")
    }
    pub fn calendar_user_address_set() -> QName {
        QName::caldav("calendar-user-address-set")
    }
    pub fn schedule_inbox_url() -> QName {
        QName::caldav("schedule-inbox-URL")
    }
    pub fn schedule_outbox_url() -> QName {
        QName::caldav("schedule-outbox-URL")
    }
}

/// Common `CardDAV` property names.
pub mod carddav_props {
    use super::QName;

    pub fn addressbook_home_set() -> QName {
        QName::carddav("addressbook-home-set")
    }
    pub fn addressbook_description() -> QName {
        QName::carddav("addressbook-description")
    }
    pub fn supported_address_data() -> QName {
        QName::carddav("supported-address-data")
    }
    pub fn max_resource_size() -> QName {
        QName::carddav("max-resource-size")
    }
    pub fn address_data() -> QName {
        QName::carddav("address-data")
    }
}

/// `CalendarServer` property names.
pub mod cs_props {
    use super::QName;

    pub fn getctag() -> QName {
        QName::cs("getctag")
    }
}
