//! iCalendar date-time and duration decoding.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use super::Property;

/// A decoded DATE or DATE-TIME value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcalTime {
    /// `YYYYMMDDTHHMMSSZ`.
    Utc(DateTime<Utc>),
    /// `YYYYMMDDTHHMMSS` — zoned via TZID or floating.
    Floating(NaiveDateTime),
    /// `YYYYMMDD` — an all-day date.
    Date(NaiveDate),
}

impl IcalTime {
    #[must_use]
    pub fn is_all_day(self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// Parses a raw DATE/DATE-TIME value. Returns `None` for anything else.
#[must_use]
pub fn parse_ical_time(value: &str) -> Option<IcalTime> {
    let value = value.trim();
    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(IcalTime::Utc(DateTime::from_naive_utc_and_offset(
            naive, Utc,
        )));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(IcalTime::Floating(naive));
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(IcalTime::Date)
}

/// ## Summary
/// Resolves a decoded time to UTC. Floating times use `tzid` when given,
/// else the configured default timezone; all-day dates resolve to local
/// midnight. An unknown TZID falls back to the default timezone.
#[must_use]
pub fn to_utc(time: IcalTime, tzid: Option<&str>, default_tz: Tz) -> DateTime<Utc> {
    let tz: Tz = tzid.and_then(|name| name.parse().ok()).unwrap_or(default_tz);
    match time {
        IcalTime::Utc(dt) => dt,
        IcalTime::Floating(naive) => naive
            .and_local_timezone(tz)
            .earliest()
            .map_or_else(|| DateTime::from_naive_utc_and_offset(naive, Utc), |dt| {
                dt.with_timezone(&Utc)
            }),
        IcalTime::Date(date) => {
            let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
            naive
                .and_local_timezone(tz)
                .earliest()
                .map_or_else(|| DateTime::from_naive_utc_and_offset(naive, Utc), |dt| {
                    dt.with_timezone(&Utc)
                })
        }
    }
}

/// Decodes a date-bearing property (DTSTART, DTEND, RECURRENCE-ID, …) to
/// UTC, honoring its TZID parameter.
#[must_use]
pub fn property_to_utc(property: &Property, default_tz: Tz) -> Option<DateTime<Utc>> {
    let time = parse_ical_time(&property.value)?;
    Some(to_utc(time, property.param("TZID"), default_tz))
}

/// True when the property value is a bare DATE (all-day semantics).
#[must_use]
pub fn property_is_all_day(property: &Property) -> bool {
    property.param("VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || matches!(parse_ical_time(&property.value), Some(IcalTime::Date(_)))
}

/// Formats a UTC instant as `YYYYMMDDTHHMMSSZ`.
#[must_use]
pub fn format_utc_stamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Formats an all-day date as `YYYYMMDD`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// ## Summary
/// Parses an RFC 5545 DURATION (`P2DT3H`, `-PT30M`, `P1W`, …).
/// Returns `None` for malformed values.
#[must_use]
pub fn parse_duration(value: &str) -> Option<TimeDelta> {
    let value = value.trim();
    let (negative, rest) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = TimeDelta::zero();
    let mut in_time = false;
    let mut digits = String::new();
    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            '0'..='9' => digits.push(ch),
            'W' | 'D' | 'H' | 'M' | 'S' => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                total += match (ch, in_time) {
                    ('W', false) => TimeDelta::weeks(n),
                    ('D', false) => TimeDelta::days(n),
                    ('H', true) => TimeDelta::hours(n),
                    ('M', true) => TimeDelta::minutes(n),
                    ('S', true) => TimeDelta::seconds(n),
                    _ => return None,
                };
            }
            _ => return None,
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_all_three_forms() {
        assert!(matches!(
            parse_ical_time("20250101T100000Z"),
            Some(IcalTime::Utc(_))
        ));
        assert!(matches!(
            parse_ical_time("20250101T100000"),
            Some(IcalTime::Floating(_))
        ));
        assert!(matches!(parse_ical_time("20250101"), Some(IcalTime::Date(_))));
        assert_eq!(parse_ical_time("not-a-date"), None);
    }

    #[test]
    fn tzid_resolution() {
        let time = parse_ical_time("20250601T120000").expect("floating");
        let utc = to_utc(time, Some("Europe/Berlin"), chrono_tz::UTC);
        // CEST is UTC+2 in June.
        assert_eq!(utc, Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).single().expect("ts"));
    }

    #[test]
    fn unknown_tzid_falls_back_to_default() {
        let time = parse_ical_time("20250601T120000").expect("floating");
        let utc = to_utc(time, Some("Nowhere/Invalid"), chrono_tz::UTC);
        assert_eq!(utc, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("ts"));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("PT1H"), Some(TimeDelta::hours(1)));
        assert_eq!(
            parse_duration("P2DT3H30M"),
            Some(TimeDelta::days(2) + TimeDelta::hours(3) + TimeDelta::minutes(30))
        );
        assert_eq!(parse_duration("P1W"), Some(TimeDelta::weeks(1)));
        assert_eq!(parse_duration("-PT15M"), Some(-TimeDelta::minutes(15)));
        assert_eq!(parse_duration("1H"), None);
        assert_eq!(parse_duration("P1X"), None);
    }

    #[test]
    fn stamp_formatting() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).single().expect("ts");
        assert_eq!(format_utc_stamp(dt), "20250101T100000Z");
    }
}
