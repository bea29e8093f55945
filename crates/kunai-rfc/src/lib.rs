//! Protocol text handling for kunai: WebDAV XML grammars (PROPFIND,
//! PROPPATCH, REPORT, Multi-Status), the iCalendar content-line layer, and
//! vCard validation. This crate performs no I/O.

pub mod dav;
pub mod error;
pub mod ical;
pub mod vcard;
