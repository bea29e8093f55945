//! WebDAV XML types, request parsers, and the Multi-Status serializer.

pub mod build;
pub mod multistatus;
pub mod namespace;
pub mod parse;
pub mod property;
pub mod report;

pub use multistatus::{Multistatus, Propstat, PropstatResponse, Status};
pub use namespace::{CALDAV_NS, CARDDAV_NS, CS_NS, DAV_NS, Namespace, QName};
pub use property::{Ace, AcePrincipal, DavProperty, Privilege, PropertyValue};
pub use report::{
    AddressbookQuery, CalendarQuery, MatchType, Multiget, PropFilter, ReportRequest,
    SyncCollection, TextMatch, TimeRange,
};
