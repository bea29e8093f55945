//! Request body parsers built on the quick-xml event reader.

pub mod propfind;
pub mod proppatch;
pub mod report;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::BytesStart;

use crate::dav::namespace::QName;
use crate::error::{RfcError, RfcResult};

/// Collects `xmlns` / `xmlns:prefix` declarations from an element into the
/// running prefix map. Later declarations shadow earlier ones.
pub(crate) fn collect_namespaces(
    e: &BytesStart<'_>,
    namespaces: &mut Vec<(String, String)>,
) -> RfcResult<()> {
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = std::str::from_utf8(&attr.value)?.to_string();
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((prefix.to_string(), value));
        } else if key == "xmlns" {
            namespaces.push((String::new(), value));
        }
    }
    Ok(())
}

/// Resolves an element's prefixed name against the collected namespace
/// declarations. Unknown prefixes fall back to `DAV:`.
pub(crate) fn resolve_qname(
    e: &BytesStart<'_>,
    namespaces: &[(String, String)],
) -> RfcResult<QName> {
    let raw = std::str::from_utf8(e.name().as_ref())?.to_string();
    let (prefix, local) = raw
        .split_once(':')
        .map_or(("", raw.as_str()), |(p, l)| (p, l));

    let uri = namespaces
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map_or_else(|| "DAV:".to_string(), |(_, u)| u.clone());

    Ok(QName::new(uri, local.to_string()))
}

/// Decodes text-event bytes through the reader's decoder.
pub(crate) fn decode_text(
    reader: &quick_xml::Reader<&[u8]>,
    bytes: &[u8],
) -> RfcResult<String> {
    reader
        .decoder()
        .decode(bytes)
        .map(|cow| cow.into_owned())
        .map_err(|e| RfcError::Xml(e.to_string()))
}

/// Reads a named attribute as UTF-8 text.
pub(crate) fn get_attribute(e: &BytesStart<'_>, name: &str) -> RfcResult<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(std::str::from_utf8(&attr.value)?.to_string()));
        }
    }
    Ok(None)
}

/// Parses a `YYYYMMDDTHHMMSSZ` timestamp as used by time-range attributes.
pub(crate) fn parse_utc_stamp(value: &str) -> RfcResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .map_err(|_| RfcError::Xml(format!("invalid time-range stamp: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_stamp_round_trip() {
        let dt = parse_utc_stamp("20250101T100000Z").expect("stamp parses");
        assert_eq!(dt.format("%Y%m%dT%H%M%SZ").to_string(), "20250101T100000Z");
        assert!(parse_utc_stamp("2025-01-01").is_err());
    }
}
