//! Recurrence expansion of VEVENTs into concrete instances.
//!
//! A non-recurring event passes through unchanged when it overlaps the
//! window. Recurring events enumerate their RRULE between
//! `range_start − duration` and `range_end + duration`, merge RDATEs,
//! subtract EXDATEs by exact `YYYYMMDDTHHMMSSZ` match, and keep the
//! occurrences whose `[start, start + duration)` overlaps the window.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz as ChronoTz;
use rrule::{RRule, Tz, Unvalidated};

use kunai_rfc::ical::time::{
    format_utc_stamp, parse_ical_time, property_is_all_day, property_to_utc, to_utc,
};
use kunai_rfc::ical::{Component, Property, time::parse_duration};

use crate::error::{ServiceError, ServiceResult};

/// The recurrence-relevant fields extracted from a VEVENT.
#[derive(Debug, Clone)]
pub struct EventTimes {
    pub start: DateTime<Utc>,
    pub duration: TimeDelta,
    pub rrule: Option<String>,
    pub rdates: Vec<DateTime<Utc>>,
    pub exdates: Vec<DateTime<Utc>>,
    pub is_all_day: bool,
}

impl EventTimes {
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() || !self.rdates.is_empty()
    }
}

/// One materialized occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Position in the sorted expansion; instance UIDs use
    /// `<masterUID>-<index>`.
    pub index: usize,
}

impl Occurrence {
    /// The UTC recurrence identifier used in hrefs and instance ETags.
    #[must_use]
    pub fn recurrence_id(&self) -> String {
        format_utc_stamp(self.start)
    }
}

/// ## Summary
/// Extracts start/duration/recurrence fields from a VEVENT. Returns
/// `None` when DTSTART is missing or undecodable. All-day events default
/// to a 24-hour duration.
#[must_use]
pub fn extract_event_times(event: &Component, default_tz: ChronoTz) -> Option<EventTimes> {
    let dtstart = event.property("DTSTART")?;
    let start = property_to_utc(dtstart, default_tz)?;
    let is_all_day = property_is_all_day(dtstart);

    let duration = if let Some(dtend) = event.property("DTEND") {
        property_to_utc(dtend, default_tz).map(|end| end - start)?
    } else if let Some(dur) = event.property("DURATION") {
        parse_duration(&dur.value)?
    } else if is_all_day {
        TimeDelta::hours(24)
    } else {
        TimeDelta::zero()
    };

    Some(EventTimes {
        start,
        duration,
        rrule: event.property("RRULE").map(|p| p.value.clone()),
        rdates: collect_date_list(event, "RDATE", default_tz),
        exdates: collect_date_list(event, "EXDATE", default_tz),
        is_all_day,
    })
}

/// RDATE/EXDATE carry comma-separated value lists and may repeat.
fn collect_date_list(event: &Component, name: &str, default_tz: ChronoTz) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    for property in event.properties_named(name) {
        let tzid = property.param("TZID");
        for value in property.value.split(',') {
            if let Some(time) = parse_ical_time(value) {
                out.push(to_utc(time, tzid, default_tz));
            }
        }
    }
    out
}

/// ## Summary
/// Expands an event into the occurrences overlapping
/// `[range_start, range_end)`, sorted ascending by start.
///
/// ## Errors
/// [`ServiceError::BadRequest`] when the RRULE fails to parse or build.
pub fn expand(
    times: &EventTimes,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> ServiceResult<Vec<Occurrence>> {
    if !times.is_recurring() {
        let overlaps = times.start < range_end && times.end() > range_start;
        return Ok(if overlaps {
            vec![Occurrence {
                start: times.start,
                end: times.end(),
                index: 0,
            }]
        } else {
            Vec::new()
        });
    }

    let mut starts: Vec<DateTime<Utc>> = Vec::new();

    if let Some(ref rrule_text) = times.rrule {
        let rrule: RRule<Unvalidated> = rrule_text
            .parse()
            .map_err(|e| ServiceError::BadRequest(format!("invalid RRULE: {e}")))?;
        let dt_start = times.start.with_timezone(&Tz::UTC);
        let mut rrule_set = rrule
            .build(dt_start)
            .map_err(|e| ServiceError::BadRequest(format!("invalid RRULE: {e}")))?;

        let window_start = range_start - times.duration - TimeDelta::seconds(1);
        let window_end = range_end + times.duration;
        rrule_set = rrule_set
            .after(window_start.with_timezone(&Tz::UTC))
            .before(window_end.with_timezone(&Tz::UTC));

        starts.extend(
            rrule_set
                .all(u16::MAX)
                .dates
                .into_iter()
                .map(|dt| dt.with_timezone(&Utc)),
        );
    }

    starts.extend(times.rdates.iter().copied());

    let excluded: HashSet<String> = times.exdates.iter().map(|dt| format_utc_stamp(*dt)).collect();

    starts.sort_unstable();
    starts.dedup();

    let occurrences = starts
        .into_iter()
        .filter(|start| !excluded.contains(&format_utc_stamp(*start)))
        .filter(|start| *start < range_end && *start + times.duration > range_start)
        .enumerate()
        .map(|(index, start)| Occurrence {
            start,
            end: start + times.duration,
            index,
        })
        .collect();

    Ok(occurrences)
}

/// ## Summary
/// Materializes one occurrence of a master event as a standalone
/// VCALENDAR: the instance carries `RECURRENCE-ID`, a `<masterUID>-<i>`
/// UID, and start/end shifted to the occurrence; recurrence rule
/// properties are dropped. All-day instances reserialize their dates as
/// `YYYYMMDD`.
#[must_use]
pub fn materialize_instance(
    master: &Component,
    event: &Component,
    times: &EventTimes,
    occurrence: &Occurrence,
) -> Component {
    let mut instance = Component::named("VEVENT");

    let master_uid = event.property("UID").map_or("", |p| p.value.as_str());
    instance.push_property(Property::new("UID", format!("{master_uid}-{}", occurrence.index)));
    instance.push_property(Property::new("RECURRENCE-ID", occurrence.recurrence_id()));

    let (start_value, end_value) = if times.is_all_day {
        (
            kunai_rfc::ical::time::format_date(occurrence.start.date_naive()),
            kunai_rfc::ical::time::format_date(occurrence.end.date_naive()),
        )
    } else {
        (
            format_utc_stamp(occurrence.start),
            format_utc_stamp(occurrence.end),
        )
    };
    instance.push_property(Property::new("DTSTART", start_value));
    instance.push_property(Property::new("DTEND", end_value));

    for property in &event.properties {
        if matches!(
            property.name.as_str(),
            "UID" | "DTSTART" | "DTEND" | "DURATION" | "RRULE" | "RDATE" | "EXDATE"
                | "RECURRENCE-ID"
        ) {
            continue;
        }
        instance.push_property(property.clone());
    }

    let mut calendar = Component::named("VCALENDAR");
    for property in &master.properties {
        calendar.push_property(property.clone());
    }
    if calendar.property("VERSION").is_none() {
        calendar.push_property(Property::new("VERSION", "2.0"));
    }
    calendar.children.push(instance);
    calendar
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(lines: &[&str]) -> Component {
        let body = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\n{}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
            lines.join("\r\n")
        );
        Component::parse(&body).expect("event parses")
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("timestamp")
    }

    #[test]
    fn daily_count_expands_to_exactly_n() {
        let cal = event(&[
            "UID:evt1",
            "DTSTART:20250101T100000Z",
            "DTEND:20250101T110000Z",
            "RRULE:FREQ=DAILY;COUNT=5",
        ]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");
        let occurrences =
            expand(&times, utc(2025, 1, 1, 0, 0), utc(2025, 1, 6, 0, 0)).expect("expand");
        assert_eq!(occurrences.len(), 5);
        assert_eq!(occurrences[0].start, utc(2025, 1, 1, 10, 0));
        assert_eq!(occurrences[4].start, utc(2025, 1, 5, 10, 0));
        assert_eq!(occurrences[0].recurrence_id(), "20250101T100000Z");
        // Sorted ascending.
        assert!(occurrences.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn exdate_removes_exactly_one_instance() {
        let cal = event(&[
            "UID:evt1",
            "DTSTART:20250101T100000Z",
            "DTEND:20250101T110000Z",
            "RRULE:FREQ=DAILY;COUNT=5",
            "EXDATE:20250103T100000Z",
        ]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");
        let occurrences =
            expand(&times, utc(2025, 1, 1, 0, 0), utc(2025, 1, 6, 0, 0)).expect("expand");
        assert_eq!(occurrences.len(), 4);
        assert!(occurrences.iter().all(|o| o.start != utc(2025, 1, 3, 10, 0)));
    }

    #[test]
    fn rdate_merges_into_expansion() {
        let cal = event(&[
            "UID:evt1",
            "DTSTART:20250101T100000Z",
            "DTEND:20250101T110000Z",
            "RRULE:FREQ=DAILY;COUNT=2",
            "RDATE:20250110T100000Z",
        ]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");
        let occurrences =
            expand(&times, utc(2025, 1, 1, 0, 0), utc(2025, 2, 1, 0, 0)).expect("expand");
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[2].start, utc(2025, 1, 10, 10, 0));
    }

    #[test]
    fn non_recurring_overlap_check() {
        let cal = event(&["UID:e", "DTSTART:20250101T100000Z", "DTEND:20250101T110000Z"]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");

        let hit = expand(&times, utc(2025, 1, 1, 0, 0), utc(2025, 1, 2, 0, 0)).expect("expand");
        assert_eq!(hit.len(), 1);

        let miss = expand(&times, utc(2025, 2, 1, 0, 0), utc(2025, 2, 2, 0, 0)).expect("expand");
        assert!(miss.is_empty());
    }

    #[test]
    fn all_day_defaults_to_24h() {
        let cal = event(&["UID:e", "DTSTART;VALUE=DATE:20250101"]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");
        assert!(times.is_all_day);
        assert_eq!(times.duration, TimeDelta::hours(24));
    }

    #[test]
    fn materialized_instance_carries_recurrence_id() {
        let cal = event(&[
            "UID:evt1",
            "DTSTART:20250101T100000Z",
            "DTEND:20250101T110000Z",
            "SUMMARY:Standup",
            "RRULE:FREQ=DAILY;COUNT=3",
        ]);
        let vevent = cal.primary_component().expect("vevent");
        let times = extract_event_times(vevent, chrono_tz::UTC).expect("times");
        let occurrences =
            expand(&times, utc(2025, 1, 1, 0, 0), utc(2025, 1, 4, 0, 0)).expect("expand");

        let instance = materialize_instance(&cal, vevent, &times, &occurrences[1]);
        let ievent = instance.primary_component().expect("instance event");
        assert_eq!(ievent.property("UID").expect("uid").value, "evt1-1");
        assert_eq!(
            ievent.property("RECURRENCE-ID").expect("recid").value,
            "20250102T100000Z"
        );
        assert_eq!(ievent.property("SUMMARY").expect("summary").value, "Standup");
        assert!(ievent.property("RRULE").is_none());
    }
}
