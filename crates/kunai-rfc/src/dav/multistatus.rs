//! Multi-Status response model (RFC 4918 §13).

use super::property::DavProperty;

/// An HTTP status carried inside a Multi-Status body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Self = Self(200);
    pub const NOT_FOUND: Self = Self(404);
    pub const FORBIDDEN: Self = Self(403);

    /// Renders the full HTTP/1.1 status line used inside `<D:status>`.
    #[must_use]
    pub fn status_line(self) -> String {
        let reason = match self.0 {
            200 => "OK",
            403 => "Forbidden",
            404 => "Not Found",
            507 => "Insufficient Storage",
            _ => "Status",
        };
        format!("HTTP/1.1 {} {reason}", self.0)
    }
}

/// One `<D:propstat>` group: properties sharing a status.
#[derive(Debug, Clone)]
pub struct Propstat {
    pub status: Status,
    pub properties: Vec<DavProperty>,
}

impl Propstat {
    #[must_use]
    pub fn ok(properties: Vec<DavProperty>) -> Self {
        Self {
            status: Status::OK,
            properties,
        }
    }

    #[must_use]
    pub fn not_found(properties: Vec<DavProperty>) -> Self {
        Self {
            status: Status::NOT_FOUND,
            properties,
        }
    }
}

/// One `<D:response>` element.
///
/// A response either carries propstat groups or (for sync-collection
/// deletions) a bare per-resource status.
#[derive(Debug, Clone)]
pub struct PropstatResponse {
    pub href: String,
    pub propstats: Vec<Propstat>,
    /// Bare `<D:status>` directly under `<D:response>`; used for deleted
    /// members in sync-collection reports.
    pub status: Option<Status>,
}

impl PropstatResponse {
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            propstats: Vec::new(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_propstat(href: impl Into<String>, propstat: Propstat) -> Self {
        Self {
            href: href.into(),
            propstats: vec![propstat],
            status: None,
        }
    }

    /// A response whose resource no longer exists.
    #[must_use]
    pub fn gone(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            propstats: Vec::new(),
            status: Some(Status::NOT_FOUND),
        }
    }

    /// Splits properties into found/not-found propstat groups the way
    /// PROPFIND responses are shaped.
    #[must_use]
    pub fn from_properties(href: impl Into<String>, properties: Vec<DavProperty>) -> Self {
        let (found, missing): (Vec<_>, Vec<_>) =
            properties.into_iter().partition(|p| p.value.is_some());
        let mut propstats = Vec::new();
        if !found.is_empty() || missing.is_empty() {
            propstats.push(Propstat::ok(found));
        }
        if !missing.is_empty() {
            propstats.push(Propstat::not_found(missing));
        }
        Self {
            href: href.into(),
            propstats,
            status: None,
        }
    }
}

/// The `<D:multistatus>` document.
#[derive(Debug, Clone, Default)]
pub struct Multistatus {
    pub responses: Vec<PropstatResponse>,
    /// Top-level `<D:sync-token>` for sync-collection reports.
    pub sync_token: Option<String>,
    /// `<D:number-of-matches-within-limits>` marker, emitted when a
    /// sync page was truncated by the client's limit.
    pub matches_within_limits: bool,
}

impl Multistatus {
    #[must_use]
    pub fn new(responses: Vec<PropstatResponse>) -> Self {
        Self {
            responses,
            sync_token: None,
            matches_within_limits: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dav::QName;

    #[test]
    fn status_lines() {
        assert_eq!(Status::OK.status_line(), "HTTP/1.1 200 OK");
        assert_eq!(Status::NOT_FOUND.status_line(), "HTTP/1.1 404 Not Found");
    }

    #[test]
    fn from_properties_splits_missing() {
        let resp = PropstatResponse::from_properties(
            "/dav/calendars/a/b/",
            vec![
                DavProperty::text(QName::dav("displayname"), "B"),
                DavProperty::not_found(QName::dav("quota-used-bytes")),
            ],
        );
        assert_eq!(resp.propstats.len(), 2);
        assert_eq!(resp.propstats[0].status, Status::OK);
        assert_eq!(resp.propstats[1].status, Status::NOT_FOUND);
    }
}
