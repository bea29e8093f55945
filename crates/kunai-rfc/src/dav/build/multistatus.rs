//! Multistatus XML serialization.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::dav::multistatus::{Multistatus, PropstatResponse};
use crate::dav::namespace::{CALDAV_NS, CARDDAV_NS, CS_NS, DAV_NS};
use crate::dav::property::{AcePrincipal, DavProperty, PropertyValue};
use crate::error::{RfcError, RfcResult};

/// ## Summary
/// Converts a [`Multistatus`] into the `WebDAV` XML body of a 207
/// response.
///
/// ## Errors
/// Returns an error if XML writing fails.
pub fn serialize_multistatus(multistatus: &Multistatus) -> RfcResult<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut elem = BytesStart::new("D:multistatus");
    elem.push_attribute(("xmlns:D", DAV_NS));
    elem.push_attribute(("xmlns:C", CALDAV_NS));
    elem.push_attribute(("xmlns:CR", CARDDAV_NS));
    elem.push_attribute(("xmlns:CS", CS_NS));
    writer.write_event(Event::Start(elem))?;

    for response in &multistatus.responses {
        write_response(&mut writer, response)?;
    }

    if let Some(ref token) = multistatus.sync_token {
        write_text_element(&mut writer, "D:sync-token", token)?;
    }
    if multistatus.matches_within_limits {
        writer.write_event(Event::Empty(BytesStart::new(
            "D:number-of-matches-within-limits",
        )))?;
    }

    writer.write_event(Event::End(BytesEnd::new("D:multistatus")))?;

    let result = writer.into_inner();
    String::from_utf8(result).map_err(|e| {
        tracing::error!("generated invalid UTF-8 in multistatus XML: {e}");
        RfcError::Xml("invalid UTF-8 in XML output".to_string())
    })
}

fn write_response<W: std::io::Write>(
    writer: &mut Writer<W>,
    response: &PropstatResponse,
) -> RfcResult<()> {
    writer.write_event(Event::Start(BytesStart::new("D:response")))?;
    write_text_element(writer, "D:href", &response.href)?;

    if let Some(status) = response.status {
        write_text_element(writer, "D:status", &status.status_line())?;
    }

    for propstat in &response.propstats {
        writer.write_event(Event::Start(BytesStart::new("D:propstat")))?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        for prop in &propstat.properties {
            write_property(writer, prop)?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        write_text_element(writer, "D:status", &propstat.status.status_line())?;
        writer.write_event(Event::End(BytesEnd::new("D:propstat")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("D:response")))?;
    Ok(())
}

fn namespace_prefix(uri: &str) -> &'static str {
    match uri {
        CALDAV_NS => "C",
        CARDDAV_NS => "CR",
        CS_NS => "CS",
        _ => "D",
    }
}

fn write_property<W: std::io::Write>(writer: &mut Writer<W>, prop: &DavProperty) -> RfcResult<()> {
    let prefix = namespace_prefix(prop.name.namespace_uri());
    let elem_name = format!("{}:{}", prefix, prop.name.local_name());

    match &prop.value {
        Some(PropertyValue::Text(text)) => write_text_element(writer, &elem_name, text)?,
        Some(PropertyValue::Integer(n)) => write_text_element(writer, &elem_name, &n.to_string())?,
        Some(PropertyValue::ContentData(data)) => write_text_element(writer, &elem_name, data)?,
        Some(PropertyValue::Href(href)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            write_text_element(writer, "D:href", href)?;
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::HrefSet(hrefs)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for href in hrefs {
                write_text_element(writer, "D:href", href)?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::ResourceType(types)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for rt in types {
                let rt_name = format!("{}:{}", namespace_prefix(rt.namespace_uri()), rt.local_name());
                writer.write_event(Event::Empty(BytesStart::new(&rt_name)))?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::SupportedReports(reports)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for report in reports {
                writer.write_event(Event::Start(BytesStart::new("D:supported-report")))?;
                writer.write_event(Event::Start(BytesStart::new("D:report")))?;
                let r_name =
                    format!("{}:{}", namespace_prefix(report.namespace_uri()), report.local_name());
                writer.write_event(Event::Empty(BytesStart::new(&r_name)))?;
                writer.write_event(Event::End(BytesEnd::new("D:report")))?;
                writer.write_event(Event::End(BytesEnd::new("D:supported-report")))?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::SupportedComponents(components)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for comp in components {
                let mut comp_elem = BytesStart::new("C:comp");
                comp_elem.push_attribute(("name", comp.as_str()));
                writer.write_event(Event::Empty(comp_elem))?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::SupportedCollations(collations)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for collation in collations {
                write_text_element(writer, "C:supported-collation", collation)?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::DataTypes(pairs)) => {
            let child_prefix = namespace_prefix(prop.name.namespace_uri());
            let child = match child_prefix {
                "CR" => "CR:address-data-type",
                _ => "C:calendar-data",
            };
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for (content_type, version) in pairs {
                let mut data_elem = BytesStart::new(child);
                data_elem.push_attribute(("content-type", content_type.as_str()));
                data_elem.push_attribute(("version", version.as_str()));
                writer.write_event(Event::Empty(data_elem))?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::Privileges(privileges)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for privilege in privileges {
                write_privilege(writer, *privilege)?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::Acl(aces)) => {
            writer.write_event(Event::Start(BytesStart::new(&elem_name)))?;
            for ace in aces {
                writer.write_event(Event::Start(BytesStart::new("D:ace")))?;
                writer.write_event(Event::Start(BytesStart::new("D:principal")))?;
                match &ace.principal {
                    AcePrincipal::Href(href) => write_text_element(writer, "D:href", href)?,
                    AcePrincipal::Authenticated => {
                        writer.write_event(Event::Empty(BytesStart::new("D:authenticated")))?;
                    }
                    AcePrincipal::All => {
                        writer.write_event(Event::Empty(BytesStart::new("D:all")))?;
                    }
                }
                writer.write_event(Event::End(BytesEnd::new("D:principal")))?;
                writer.write_event(Event::Start(BytesStart::new("D:grant")))?;
                for privilege in &ace.grant {
                    write_privilege(writer, *privilege)?;
                }
                writer.write_event(Event::End(BytesEnd::new("D:grant")))?;
                if ace.protected {
                    writer.write_event(Event::Empty(BytesStart::new("D:protected")))?;
                }
                writer.write_event(Event::End(BytesEnd::new("D:ace")))?;
            }
            writer.write_event(Event::End(BytesEnd::new(&elem_name)))?;
        }
        Some(PropertyValue::Empty) | None => {
            writer.write_event(Event::Empty(BytesStart::new(&elem_name)))?;
        }
    }

    Ok(())
}

fn write_privilege<W: std::io::Write>(
    writer: &mut Writer<W>,
    privilege: crate::dav::property::Privilege,
) -> RfcResult<()> {
    let qname = privilege.qname();
    let name = format!("{}:{}", namespace_prefix(qname.namespace_uri()), qname.local_name());
    writer.write_event(Event::Start(BytesStart::new("D:privilege")))?;
    writer.write_event(Event::Empty(BytesStart::new(&name)))?;
    writer.write_event(Event::End(BytesEnd::new("D:privilege")))?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> RfcResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
