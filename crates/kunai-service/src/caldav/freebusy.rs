//! Busy-interval aggregation and VFREEBUSY rendering.

use chrono::{DateTime, Utc};

use kunai_rfc::ical::time::format_utc_stamp;
use kunai_rfc::ical::{Component, Property};

/// A half-open busy interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// ## Summary
/// Merges intervals by sort-and-fold into a sorted, pairwise-disjoint,
/// maximal cover of their union. Empty and inverted intervals are
/// dropped.
#[must_use]
pub fn merge_busy(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.retain(|i| i.start < i.end);
    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// ## Summary
/// Renders merged busy intervals as a `text/calendar` body holding one
/// VFREEBUSY with `FBTYPE=BUSY` period lines.
#[must_use]
pub fn render_vfreebusy(
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    busy: &[BusyInterval],
    organizer: Option<&str>,
    attendee: Option<&str>,
) -> String {
    let mut vfreebusy = Component::named("VFREEBUSY");
    vfreebusy.push_property(Property::new("DTSTAMP", format_utc_stamp(Utc::now())));
    vfreebusy.push_property(Property::new("DTSTART", format_utc_stamp(range_start)));
    vfreebusy.push_property(Property::new("DTEND", format_utc_stamp(range_end)));
    if let Some(organizer) = organizer {
        vfreebusy.push_property(Property::new("ORGANIZER", organizer));
    }
    if let Some(attendee) = attendee {
        vfreebusy.push_property(Property::new("ATTENDEE", attendee));
    }
    for interval in busy {
        let mut property = Property::new(
            "FREEBUSY",
            format!(
                "{}/{}",
                format_utc_stamp(interval.start),
                format_utc_stamp(interval.end)
            ),
        );
        property.params.push(("FBTYPE".to_string(), "BUSY".to_string()));
        vfreebusy.push_property(property);
    }

    let mut calendar = Component::named("VCALENDAR");
    calendar.push_property(Property::new("VERSION", "2.0"));
    calendar.push_property(Property::new("PRODID", "-//kunai//freebusy//EN"));
    calendar.children.push(vfreebusy);
    calendar.serialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).single().expect("timestamp")
    }

    fn interval(start: DateTime<Utc>, end: DateTime<Utc>) -> BusyInterval {
        BusyInterval { start, end }
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        let merged = merge_busy(vec![
            interval(utc(12, 0), utc(13, 0)),
            interval(utc(9, 0), utc(10, 0)),
            interval(utc(9, 30), utc(11, 0)),
            interval(utc(11, 0), utc(11, 30)),
        ]);
        assert_eq!(
            merged,
            vec![
                interval(utc(9, 0), utc(11, 30)),
                interval(utc(12, 0), utc(13, 0)),
            ]
        );
    }

    #[test]
    fn merge_is_disjoint_and_sorted() {
        let merged = merge_busy(vec![
            interval(utc(14, 0), utc(15, 0)),
            interval(utc(8, 0), utc(9, 0)),
            interval(utc(8, 30), utc(8, 45)),
        ]);
        assert!(merged.windows(2).all(|w| w[0].end < w[1].start));
        assert!(merged.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn degenerate_intervals_dropped() {
        let merged = merge_busy(vec![
            interval(utc(9, 0), utc(9, 0)),
            interval(utc(10, 0), utc(9, 0)),
        ]);
        assert!(merged.is_empty());
    }

    #[test]
    fn vfreebusy_body_shape() {
        let body = render_vfreebusy(
            utc(0, 0),
            utc(23, 0),
            &[interval(utc(9, 0), utc(10, 0))],
            Some("mailto:alice@example.com"),
            Some("mailto:bob@example.com"),
        );
        assert!(body.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(body.contains("BEGIN:VFREEBUSY\r\n"));
        assert!(body.contains("FREEBUSY;FBTYPE=BUSY:20250101T090000Z/20250101T100000Z\r\n"));
        assert!(body.contains("ORGANIZER:mailto:alice@example.com\r\n"));
        // The serialized body parses back.
        assert!(Component::parse(&body).is_ok());
    }
}
