//! XML namespace and qualified name types.

use std::borrow::Cow;

/// `DAV:` namespace URI.
pub const DAV_NS: &str = "DAV:";

/// `CalDAV` namespace URI.
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// `CardDAV` namespace URI.
pub const CARDDAV_NS: &str = "urn:ietf:params:xml:ns:carddav";

/// `CalendarServer` (Apple) namespace URI.
pub const CS_NS: &str = "http://calendarserver.org/ns/";

/// An XML namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(pub Cow<'static, str>);

impl Namespace {
    pub const DAV: Self = Self(Cow::Borrowed(DAV_NS));
    pub const CALDAV: Self = Self(Cow::Borrowed(CALDAV_NS));
    pub const CARDDAV: Self = Self(Cow::Borrowed(CARDDAV_NS));
    pub const CS: Self = Self(Cow::Borrowed(CS_NS));

    /// Creates a new namespace from a string.
    #[must_use]
    pub fn new(uri: impl Into<Cow<'static, str>>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the conventional prefix for this namespace.
    #[must_use]
    pub fn default_prefix(&self) -> Option<&'static str> {
        match self.0.as_ref() {
            DAV_NS => Some("D"),
            CALDAV_NS => Some("C"),
            CARDDAV_NS => Some("CR"),
            CS_NS => Some("CS"),
            _ => None,
        }
    }
}

impl From<&'static str> for Namespace {
    fn from(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

/// A qualified XML name (namespace + local name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Namespace,
    pub local_name: Cow<'static, str>,
}

impl QName {
    #[must_use]
    pub fn new(namespace: impl Into<Namespace>, local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Creates a `DAV:` qualified name.
    #[must_use]
    pub fn dav(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::DAV,
            local_name: local_name.into(),
        }
    }

    /// Creates a `CalDAV` qualified name.
    #[must_use]
    pub fn caldav(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::CALDAV,
            local_name: local_name.into(),
        }
    }

    /// Creates a `CardDAV` qualified name.
    #[must_use]
    pub fn carddav(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::CARDDAV,
            local_name: local_name.into(),
        }
    }

    /// Creates a `CalendarServer` qualified name.
    #[must_use]
    pub fn cs(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::CS,
            local_name: local_name.into(),
        }
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        self.namespace.as_str()
    }

    #[must_use]
    pub fn is_dav(&self) -> bool {
        self.namespace == Namespace::DAV
    }

    #[must_use]
    pub fn is_caldav(&self) -> bool {
        self.namespace == Namespace::CALDAV
    }

    #[must_use]
    pub fn is_carddav(&self) -> bool {
        self.namespace == Namespace::CARDDAV
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace.as_str(), self.local_name)
    }
}
