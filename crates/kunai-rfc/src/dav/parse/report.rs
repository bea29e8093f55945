//! REPORT request XML parsing.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{collect_namespaces, decode_text, get_attribute, parse_utc_stamp, resolve_qname};
use crate::dav::namespace::QName;
use crate::dav::report::{
    AddressbookQuery, CalendarQuery, MatchType, Multiget, ParamFilter, PropFilter, ReportRequest,
    SyncCollection, TextMatch, TimeRange,
};
use crate::error::{RfcError, RfcResult};

/// ## Summary
/// Parses a REPORT request body, dispatching on the root element's local
/// name.
///
/// ## Errors
/// [`RfcError::UnsupportedReport`] for unrecognized roots, [`RfcError::Xml`]
/// for malformed documents.
pub fn parse_report(xml: &[u8]) -> RfcResult<ReportRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                let local = std::str::from_utf8(e.local_name().as_ref())?.to_owned();
                return match local.as_str() {
                    "calendar-query" => parse_calendar_query(xml),
                    "calendar-multiget" => parse_multiget(xml).map(ReportRequest::CalendarMultiget),
                    "addressbook-query" => parse_addressbook_query(xml),
                    "addressbook-multiget" => {
                        parse_multiget(xml).map(ReportRequest::AddressbookMultiget)
                    }
                    "sync-collection" => parse_sync_collection(xml),
                    "free-busy-query" => parse_free_busy_query(xml),
                    _ => Err(RfcError::UnsupportedReport(local)),
                };
            }
            Ok(Event::Eof) => return Err(RfcError::MissingElement("report root element")),
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_time_range_attrs(e: &BytesStart<'_>) -> RfcResult<TimeRange> {
    let start = get_attribute(e, "start")?
        .map(|v| parse_utc_stamp(&v))
        .transpose()?;
    let end = get_attribute(e, "end")?
        .map(|v| parse_utc_stamp(&v))
        .transpose()?;
    Ok(TimeRange { start, end })
}

/// Parses a calendar-query: requested properties plus the distilled filter
/// (leaf comp-filter names and the innermost time-range).
fn parse_calendar_query(xml: &[u8]) -> RfcResult<ReportRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut query = CalendarQuery::default();

    let mut in_prop = false;
    let mut filter_depth: usize = 0;
    let mut deepest_range_depth = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"prop" if filter_depth == 0 => in_prop = true,
                    b"filter" => filter_depth = 1,
                    b"comp-filter" if filter_depth > 0 => {
                        filter_depth += 1;
                        record_comp_filter(e, &mut query)?;
                    }
                    b"time-range" if filter_depth > 0 => {
                        if filter_depth >= deepest_range_depth {
                            deepest_range_depth = filter_depth;
                            query.time_range = Some(parse_time_range_attrs(e)?);
                        }
                        filter_depth += 1;
                    }
                    _ if filter_depth > 0 => filter_depth += 1,
                    _ if in_prop => query.properties.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"comp-filter" if filter_depth > 0 => record_comp_filter(e, &mut query)?,
                    b"time-range" if filter_depth > 0 => {
                        // Innermost wins: a deeper nesting level replaces
                        // anything recorded further out.
                        if filter_depth >= deepest_range_depth {
                            deepest_range_depth = filter_depth;
                            query.time_range = Some(parse_time_range_attrs(e)?);
                        }
                    }
                    _ if in_prop && filter_depth == 0 => {
                        query.properties.push(resolve_qname(e, &namespaces)?);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"prop" => in_prop = false,
                b"filter" => filter_depth = 0,
                _ => {
                    if filter_depth > 1 {
                        filter_depth -= 1;
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(ReportRequest::CalendarQuery(query))
}

fn record_comp_filter(e: &BytesStart<'_>, query: &mut CalendarQuery) -> RfcResult<()> {
    if let Some(name) = get_attribute(e, "name")? {
        if name != "VCALENDAR" && !query.components.contains(&name) {
            query.components.push(name);
        }
    }
    Ok(())
}

/// Parses calendar-multiget / addressbook-multiget (identical grammar).
fn parse_multiget(xml: &[u8]) -> RfcResult<Multiget> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut req = Multiget::default();

    let mut in_prop = false;
    let mut in_href = false;
    let mut href_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"prop" => in_prop = true,
                    b"href" => {
                        in_href = true;
                        href_buf.clear();
                    }
                    _ if in_prop => req.properties.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                if in_prop {
                    req.properties.push(resolve_qname(e, &namespaces)?);
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_href {
                    href_buf.push_str(&decode_text(&reader, e.as_ref())?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"prop" => in_prop = false,
                b"href" => {
                    in_href = false;
                    if !href_buf.is_empty() {
                        req.hrefs.push(href_buf.trim().to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(req)
}

fn parse_sync_collection(xml: &[u8]) -> RfcResult<ReportRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut req = SyncCollection::default();

    let mut in_prop = false;
    let mut in_token = false;
    let mut in_nresults = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"prop" => in_prop = true,
                    b"sync-token" => {
                        in_token = true;
                        text.clear();
                    }
                    b"nresults" => {
                        in_nresults = true;
                        text.clear();
                    }
                    _ if in_prop => req.properties.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                if in_prop {
                    req.properties.push(resolve_qname(e, &namespaces)?);
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_token || in_nresults {
                    text.push_str(&decode_text(&reader, e.as_ref())?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"prop" => in_prop = false,
                b"sync-token" => {
                    in_token = false;
                    req.sync_token = text.trim().to_string();
                }
                b"nresults" => {
                    in_nresults = false;
                    req.limit = text.trim().parse().ok();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(ReportRequest::SyncCollection(req))
}

fn parse_free_busy_query(xml: &[u8]) -> RfcResult<ReportRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e) | Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"time-range" {
                    return Ok(ReportRequest::FreeBusyQuery(parse_time_range_attrs(e)?));
                }
            }
            Ok(Event::Eof) => return Err(RfcError::MissingElement("time-range")),
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_addressbook_query(xml: &[u8]) -> RfcResult<ReportRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut query = AddressbookQuery {
        any_of: true,
        ..AddressbookQuery::default()
    };

    let mut in_prop = false;
    let mut in_nresults = false;
    let mut current_filter: Option<PropFilter> = None;
    let mut pending_match: Option<TextMatch> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"prop" => in_prop = true,
                    b"filter" => {
                        if let Some(test) = get_attribute(e, "test")? {
                            query.any_of = test != "allof";
                        }
                    }
                    b"prop-filter" => {
                        current_filter = Some(PropFilter {
                            name: get_attribute(e, "name")?.unwrap_or_default(),
                            is_not_defined: false,
                            text_match: None,
                            param_filters: Vec::new(),
                        });
                    }
                    b"text-match" => {
                        pending_match = Some(text_match_from_attrs(e)?);
                        text.clear();
                    }
                    b"nresults" => {
                        in_nresults = true;
                        text.clear();
                    }
                    _ if in_prop => query.properties.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"prop-filter" => {
                        query.prop_filters.push(PropFilter {
                            name: get_attribute(e, "name")?.unwrap_or_default(),
                            is_not_defined: false,
                            text_match: None,
                            param_filters: Vec::new(),
                        });
                    }
                    b"is-not-defined" => {
                        if let Some(f) = current_filter.as_mut() {
                            f.is_not_defined = true;
                        }
                    }
                    b"param-filter" => {
                        if let Some(f) = current_filter.as_mut() {
                            f.param_filters.push(ParamFilter {
                                name: get_attribute(e, "name")?.unwrap_or_default(),
                                is_not_defined: false,
                            });
                        }
                    }
                    _ if in_prop => query.properties.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if pending_match.is_some() || in_nresults {
                    text.push_str(&decode_text(&reader, e.as_ref())?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"prop" => in_prop = false,
                b"text-match" => {
                    if let (Some(mut m), Some(f)) = (pending_match.take(), current_filter.as_mut())
                    {
                        m.value = std::mem::take(&mut text);
                        f.text_match = Some(m);
                    }
                }
                b"prop-filter" => {
                    if let Some(f) = current_filter.take() {
                        query.prop_filters.push(f);
                    }
                }
                b"nresults" => {
                    in_nresults = false;
                    query.limit = text.trim().parse().ok();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(ReportRequest::AddressbookQuery(query))
}

fn text_match_from_attrs(e: &BytesStart<'_>) -> RfcResult<TextMatch> {
    let match_type = match get_attribute(e, "match-type")?.as_deref() {
        Some("equals") => MatchType::Equals,
        Some("starts-with") => MatchType::StartsWith,
        Some("ends-with") => MatchType::EndsWith,
        _ => MatchType::Contains,
    };
    Ok(TextMatch {
        value: String::new(),
        collation: get_attribute(e, "collation")?
            .unwrap_or_else(|| "i;unicode-casemap".to_string()),
        negate: get_attribute(e, "negate-condition")?.as_deref() == Some("yes"),
        match_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn calendar_query_extracts_components_and_range() {
        let body = br#"<?xml version="1.0"?>
            <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><D:getetag/><C:calendar-data/></D:prop>
              <C:filter>
                <C:comp-filter name="VCALENDAR">
                  <C:comp-filter name="VEVENT">
                    <C:time-range start="20250101T000000Z" end="20250102T000000Z"/>
                  </C:comp-filter>
                </C:comp-filter>
              </C:filter>
            </C:calendar-query>"#;
        let ReportRequest::CalendarQuery(q) = parse_report(body).expect("parses") else {
            panic!("expected calendar-query");
        };
        assert_eq!(q.components, vec!["VEVENT".to_string()]);
        let range = q.time_range.expect("time range parsed");
        assert_eq!(range.start, Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("ts")));
        assert_eq!(range.end, Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).single().expect("ts")));
        assert_eq!(q.properties.len(), 2);
    }

    #[test]
    fn multiget_collects_hrefs() {
        let body = br#"<C:calendar-multiget xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><D:getetag/></D:prop>
              <D:href>/dav/calendars/alice/work/evt1.ics</D:href>
              <D:href>/dav/calendars/alice/work/evt2.ics</D:href>
            </C:calendar-multiget>"#;
        let ReportRequest::CalendarMultiget(m) = parse_report(body).expect("parses") else {
            panic!("expected multiget");
        };
        assert_eq!(m.hrefs.len(), 2);
        assert_eq!(m.hrefs[0], "/dav/calendars/alice/work/evt1.ics");
    }

    #[test]
    fn sync_collection_token_and_limit() {
        let body = br#"<D:sync-collection xmlns:D="DAV:">
              <D:sync-token>seq:42</D:sync-token>
              <D:limit><D:nresults>50</D:nresults></D:limit>
              <D:prop><D:getetag/></D:prop>
            </D:sync-collection>"#;
        let ReportRequest::SyncCollection(s) = parse_report(body).expect("parses") else {
            panic!("expected sync-collection");
        };
        assert_eq!(s.sync_token, "seq:42");
        assert_eq!(s.limit, Some(50));
    }

    #[test]
    fn addressbook_query_text_match() {
        let body = br#"<CR:addressbook-query xmlns:D="DAV:" xmlns:CR="urn:ietf:params:xml:ns:carddav">
              <D:prop><D:getetag/><CR:address-data/></D:prop>
              <CR:filter test="anyof">
                <CR:prop-filter name="FN">
                  <CR:text-match collation="i;unicode-casemap" negate-condition="yes">smith</CR:text-match>
                </CR:prop-filter>
              </CR:filter>
            </CR:addressbook-query>"#;
        let ReportRequest::AddressbookQuery(q) = parse_report(body).expect("parses") else {
            panic!("expected addressbook-query");
        };
        assert!(q.any_of);
        assert_eq!(q.prop_filters.len(), 1);
        let f = &q.prop_filters[0];
        assert_eq!(f.name, "FN");
        let m = f.text_match.as_ref().expect("text match");
        assert_eq!(m.value, "smith");
        assert!(m.negate);
        assert_eq!(m.match_type, MatchType::Contains);
    }

    #[test]
    fn unsupported_report_root() {
        let body = br#"<D:principal-match xmlns:D="DAV:"/>"#;
        assert!(matches!(
            parse_report(body),
            Err(RfcError::UnsupportedReport(name)) if name == "principal-match"
        ));
    }

    #[test]
    fn free_busy_query_requires_time_range() {
        let body = br#"<C:free-busy-query xmlns:C="urn:ietf:params:xml:ns:caldav">
              <C:time-range start="20250101T000000Z" end="20250102T000000Z"/>
            </C:free-busy-query>"#;
        let ReportRequest::FreeBusyQuery(range) = parse_report(body).expect("parses") else {
            panic!("expected free-busy-query");
        };
        assert!(range.is_bounded());
    }
}
