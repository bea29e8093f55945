//! `C:schedule-response` serialization for Outbox POSTs (RFC 6638 §8.1).

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::dav::namespace::{CALDAV_NS, DAV_NS};
use crate::error::{RfcError, RfcResult};

/// One per-recipient outcome inside a schedule-response.
#[derive(Debug, Clone)]
pub struct ScheduleResponse {
    /// Recipient calendar user address, e.g. `mailto:bob@example.com`.
    pub recipient: String,
    /// iTIP request status, e.g. `2.0;Success`.
    pub request_status: String,
    /// Serialized VFREEBUSY reply for successful free-busy requests.
    pub calendar_data: Option<String>,
}

impl ScheduleResponse {
    pub const STATUS_SUCCESS: &'static str = "2.0;Success";
    pub const STATUS_INVALID_USER: &'static str = "3.7;Invalid calendar user";
    pub const STATUS_UNAVAILABLE: &'static str = "5.1;Service unavailable";
}

/// ## Summary
/// Serializes the `C:schedule-response` document returned by an Outbox
/// free-busy POST.
///
/// ## Errors
/// Returns an error if XML writing fails.
pub fn serialize_schedule_response(responses: &[ScheduleResponse]) -> RfcResult<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("C:schedule-response");
    root.push_attribute(("xmlns:D", DAV_NS));
    root.push_attribute(("xmlns:C", CALDAV_NS));
    writer.write_event(Event::Start(root))?;

    for response in responses {
        writer.write_event(Event::Start(BytesStart::new("C:response")))?;

        writer.write_event(Event::Start(BytesStart::new("C:recipient")))?;
        writer.write_event(Event::Start(BytesStart::new("D:href")))?;
        writer.write_event(Event::Text(BytesText::new(&response.recipient)))?;
        writer.write_event(Event::End(BytesEnd::new("D:href")))?;
        writer.write_event(Event::End(BytesEnd::new("C:recipient")))?;

        writer.write_event(Event::Start(BytesStart::new("C:request-status")))?;
        writer.write_event(Event::Text(BytesText::new(&response.request_status)))?;
        writer.write_event(Event::End(BytesEnd::new("C:request-status")))?;

        if let Some(ref data) = response.calendar_data {
            writer.write_event(Event::Start(BytesStart::new("C:calendar-data")))?;
            writer.write_event(Event::Text(BytesText::new(data)))?;
            writer.write_event(Event::End(BytesEnd::new("C:calendar-data")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("C:response")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("C:schedule-response")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|_| RfcError::Xml("invalid UTF-8 in XML output".to_string()))
}
