//! PROPFIND request parsing (RFC 4918 §9.1).

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{collect_namespaces, resolve_qname};
use crate::dav::namespace::QName;
use crate::error::{RfcError, RfcResult};

/// Which flavour of PROPFIND was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropfindType {
    /// `<D:prop>` with an explicit list.
    Prop(Vec<QName>),
    /// `<D:allprop/>` or an empty body.
    AllProp,
    /// `<D:propname/>`.
    PropName,
}

/// A parsed PROPFIND request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropfindRequest {
    pub kind: PropfindType,
}

impl PropfindRequest {
    /// The explicitly requested names, or `None` for allprop/propname.
    #[must_use]
    pub fn requested(&self) -> Option<&[QName]> {
        match &self.kind {
            PropfindType::Prop(names) => Some(names),
            _ => None,
        }
    }
}

/// ## Summary
/// Parses a PROPFIND body. An empty body means `allprop` per RFC 4918.
///
/// ## Errors
/// Returns an error for malformed XML.
pub fn parse_propfind(xml: &[u8]) -> RfcResult<PropfindRequest> {
    if xml.iter().all(u8::is_ascii_whitespace) {
        return Ok(PropfindRequest {
            kind: PropfindType::AllProp,
        });
    }

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut names: Vec<QName> = Vec::new();
    let mut kind: Option<PropfindType> = None;
    let mut in_prop = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                let local = e.local_name();
                match local.as_ref() {
                    b"propfind" => {}
                    b"prop" => in_prop = true,
                    b"allprop" => kind = Some(PropfindType::AllProp),
                    b"propname" => kind = Some(PropfindType::PropName),
                    _ if in_prop => names.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                let local = e.local_name();
                match local.as_ref() {
                    b"allprop" => kind = Some(PropfindType::AllProp),
                    b"propname" => kind = Some(PropfindType::PropName),
                    _ if in_prop => names.push(resolve_qname(e, &namespaces)?),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"prop" {
                    in_prop = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let kind = match kind {
        Some(k) => k,
        None if !names.is_empty() => PropfindType::Prop(names),
        None => PropfindType::AllProp,
    };
    Ok(PropfindRequest { kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prop_list() {
        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
              <D:prop><D:displayname/><CS:getctag/></D:prop>
            </D:propfind>"#;
        let req = parse_propfind(body).expect("parses");
        let names = req.requested().expect("explicit prop list");
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], QName::dav("displayname"));
        assert_eq!(names[1], QName::cs("getctag"));
    }

    #[test]
    fn empty_body_is_allprop() {
        let req = parse_propfind(b"  ").expect("parses");
        assert_eq!(req.kind, PropfindType::AllProp);
    }

    #[test]
    fn allprop_element() {
        let body = br#"<D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        let req = parse_propfind(body).expect("parses");
        assert_eq!(req.kind, PropfindType::AllProp);
    }
}
