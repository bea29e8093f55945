//! PROPPATCH request parsing (RFC 4918 §9.2).

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{collect_namespaces, decode_text, resolve_qname};
use crate::dav::namespace::QName;
use crate::error::{RfcError, RfcResult};

/// A parsed `D:propertyupdate` body: properties to set (with text values)
/// and properties to remove, in document order.
#[derive(Debug, Clone, Default)]
pub struct ProppatchRequest {
    pub set: Vec<(QName, String)>,
    pub remove: Vec<QName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Set,
    Remove,
}

/// ## Summary
/// Parses a PROPPATCH body into set/remove lists. Only text-valued
/// properties are captured; nested XML values are flattened to their text
/// content.
///
/// ## Errors
/// Returns an error for malformed XML.
pub fn parse_proppatch(xml: &[u8]) -> RfcResult<ProppatchRequest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut req = ProppatchRequest::default();

    let mut section = Section::None;
    let mut in_prop = false;
    let mut current: Option<QName> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                match e.local_name().as_ref() {
                    b"propertyupdate" => {}
                    b"set" => section = Section::Set,
                    b"remove" => section = Section::Remove,
                    b"prop" => in_prop = true,
                    _ if in_prop && current.is_none() => {
                        current = Some(resolve_qname(e, &namespaces)?);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                collect_namespaces(e, &mut namespaces)?;
                if in_prop && current.is_none() {
                    let name = resolve_qname(e, &namespaces)?;
                    match section {
                        Section::Set => req.set.push((name, String::new())),
                        Section::Remove => req.remove.push(name),
                        Section::None => {}
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if current.is_some() {
                    text.push_str(&decode_text(&reader, e.as_ref())?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"set" | b"remove" => section = Section::None,
                b"prop" => in_prop = false,
                _ => {
                    if let Some(name) = current.take_if(|n| {
                        n.local_name().as_bytes() == e.local_name().as_ref()
                    }) {
                        match section {
                            Section::Set => req.set.push((name, std::mem::take(&mut text))),
                            Section::Remove => req.remove.push(name),
                            Section::None => {}
                        }
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(RfcError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(req)
}
