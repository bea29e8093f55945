//! The CalDAV REPORT engine: calendar-query, calendar-multiget,
//! sync-collection, and free-busy-query execution against the store.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz as ChronoTz;

use kunai_core::path::{self, CollectionRef, DavPath};
use kunai_rfc::dav::multistatus::{Multistatus, Propstat, PropstatResponse};
use kunai_rfc::dav::namespace::QName;
use kunai_rfc::dav::property::{DavProperty, PropertyValue};
use kunai_rfc::dav::report::{CalendarQuery, Multiget, SyncCollection, TimeRange};
use kunai_rfc::ical;
use kunai_store::Store;
use kunai_store::model::{Calendar, CalendarObject, ComponentKind};

use super::freebusy::{self, BusyInterval};
use super::recurrence::{self, EventTimes};
use crate::error::{ServiceError, ServiceResult};
use crate::sync::{format_sync_token, parse_sync_token};

/// Shared inputs of the report executors.
pub struct ReportContext<'a> {
    pub store: &'a dyn Store,
    pub base_prefix: &'a str,
    pub collection: &'a CollectionRef,
    pub default_tz: ChronoTz,
}

/// Formats an HTTP-date (IMF-fixdate) for `DAV:getlastmodified`.
#[must_use]
pub fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the requested properties for a concrete resource. Unknown
/// requested names land in the 404 propstat group.
fn object_properties(
    requested: &[QName],
    etag: &str,
    data: Option<&str>,
    last_modified: DateTime<Utc>,
) -> Vec<DavProperty> {
    let default_names = [QName::dav("getetag"), QName::caldav("calendar-data")];
    let names: &[QName] = if requested.is_empty() {
        &default_names
    } else {
        requested
    };

    names
        .iter()
        .map(|name| match (name.namespace_uri(), name.local_name()) {
            ("DAV:", "getetag") => DavProperty::text(name.clone(), format!("\"{etag}\"")),
            ("DAV:", "getcontenttype") => {
                DavProperty::text(name.clone(), kunai_core::constants::CALENDAR_CONTENT_TYPE)
            }
            ("DAV:", "getlastmodified") => DavProperty::text(name.clone(), http_date(last_modified)),
            (kunai_rfc::dav::CALDAV_NS, "calendar-data") => data.map_or_else(
                || DavProperty::not_found(name.clone()),
                |payload| {
                    DavProperty::with_value(
                        name.clone(),
                        PropertyValue::ContentData(payload.to_string()),
                    )
                },
            ),
            _ => DavProperty::not_found(name.clone()),
        })
        .collect()
}

/// ## Summary
/// Executes a calendar-query: component filtering, time-range overlap,
/// and — for recurring VEVENTs inside a bounded range — expansion into
/// per-instance responses with `<UID>-<RECID>` hrefs and ETags.
///
/// ## Errors
/// Propagates store failures and malformed stored payloads are skipped.
pub async fn calendar_query(
    ctx: &ReportContext<'_>,
    calendar: &Calendar,
    query: &CalendarQuery,
) -> ServiceResult<Multistatus> {
    let objects = ctx.store.list_calendar_objects(calendar.id).await?;
    let range = query.time_range.unwrap_or_default();
    let bounded = range.is_bounded();

    let wanted: Vec<ComponentKind> = if query.components.is_empty() {
        vec![ComponentKind::Event, ComponentKind::Todo, ComponentKind::Journal]
    } else {
        query.components.iter().filter_map(|n| ComponentKind::from_name(n)).collect()
    };

    let mut responses = Vec::new();
    for object in &objects {
        if !wanted.contains(&object.component) {
            continue;
        }
        if object.component == ComponentKind::Event && bounded {
            responses.extend(expanded_event_responses(ctx, object, range, &query.properties));
        } else if overlaps_unexpanded(object, range) {
            let href = path::href::object(ctx.base_prefix, ctx.collection, &object.uid);
            responses.push(PropstatResponse::with_propstat(
                href,
                Propstat::ok(object_properties(
                    &query.properties,
                    &object.etag,
                    Some(&object.data),
                    object.updated_at,
                )),
            ));
        }
    }

    Ok(Multistatus::new(responses))
}

/// Non-VEVENT objects (and unbounded queries) match on stored times when
/// known; objects without stored times always match.
fn overlaps_unexpanded(object: &CalendarObject, range: TimeRange) -> bool {
    let Some(start) = object.start_at else {
        return true;
    };
    let end = object.end_at.unwrap_or(start);
    let before_range_end = range.end.is_none_or(|range_end| start < range_end);
    let after_range_start = range.start.is_none_or(|range_start| end > range_start);
    before_range_end && after_range_start
}

/// Expands one VEVENT into per-instance responses; a non-recurring event
/// produces its master response when it overlaps.
fn expanded_event_responses(
    ctx: &ReportContext<'_>,
    object: &CalendarObject,
    range: TimeRange,
    requested: &[QName],
) -> Vec<PropstatResponse> {
    let (Some(range_start), Some(range_end)) = (range.start, range.end) else {
        return Vec::new();
    };
    let Ok(root) = ical::Component::parse(&object.data) else {
        tracing::warn!(uid = %object.uid, "stored calendar object no longer parses, skipping");
        return Vec::new();
    };
    let Some(event) = root.primary_component() else {
        return Vec::new();
    };
    let Some(times) = recurrence::extract_event_times(event, ctx.default_tz) else {
        return Vec::new();
    };
    let Ok(occurrences) = recurrence::expand(&times, range_start, range_end) else {
        tracing::warn!(uid = %object.uid, "recurrence expansion failed, skipping");
        return Vec::new();
    };

    if !times.is_recurring() {
        return occurrences
            .first()
            .map(|_| {
                let href = path::href::object(ctx.base_prefix, ctx.collection, &object.uid);
                PropstatResponse::with_propstat(
                    href,
                    Propstat::ok(object_properties(
                        requested,
                        &object.etag,
                        Some(&object.data),
                        object.updated_at,
                    )),
                )
            })
            .into_iter()
            .collect();
    }

    occurrences
        .iter()
        .map(|occurrence| {
            let instance_uid = format!("{}-{}", object.uid, occurrence.recurrence_id());
            let href = path::href::object(ctx.base_prefix, ctx.collection, &instance_uid);
            let data = recurrence::materialize_instance(&root, event, &times, occurrence)
                .serialize();
            PropstatResponse::with_propstat(
                href,
                Propstat::ok(object_properties(
                    requested,
                    &instance_uid,
                    Some(&data),
                    object.updated_at,
                )),
            )
        })
        .collect()
}

/// ## Summary
/// Executes a calendar-multiget. Each href resolves independently;
/// recurrence-instance identifiers locate the master and re-expand within
/// ±24h of the instance time. Unresolvable hrefs yield per-resource 404s.
///
/// ## Errors
/// Propagates store failures.
pub async fn calendar_multiget(
    store: &dyn Store,
    base_prefix: &str,
    default_tz: ChronoTz,
    multiget: &Multiget,
) -> ServiceResult<Multistatus> {
    let mut responses = Vec::new();

    for href in &multiget.hrefs {
        let Ok(DavPath::Object { collection, uid }) = path::parse(base_prefix, href) else {
            responses.push(PropstatResponse::gone(href.clone()));
            continue;
        };
        let Some(calendar) = super::resolve_calendar(store, &collection).await? else {
            responses.push(PropstatResponse::gone(href.clone()));
            continue;
        };

        let response = if let Some((master_uid, recurrence)) = path::split_instance_uid(&uid) {
            instance_multiget_response(
                store,
                &calendar,
                href,
                master_uid,
                recurrence,
                &multiget.properties,
                default_tz,
            )
            .await?
        } else {
            match store.get_calendar_object(calendar.id, &uid).await? {
                Some(object) => PropstatResponse::with_propstat(
                    href.clone(),
                    Propstat::ok(object_properties(
                        &multiget.properties,
                        &object.etag,
                        Some(&object.data),
                        object.updated_at,
                    )),
                ),
                None => PropstatResponse::gone(href.clone()),
            }
        };
        responses.push(response);
    }

    Ok(Multistatus::new(responses))
}

async fn instance_multiget_response(
    store: &dyn Store,
    calendar: &Calendar,
    href: &str,
    master_uid: &str,
    recurrence: &str,
    requested: &[QName],
    default_tz: ChronoTz,
) -> ServiceResult<PropstatResponse> {
    let Some(object) = store.get_calendar_object(calendar.id, master_uid).await? else {
        return Ok(PropstatResponse::gone(href.to_string()));
    };
    let Some(instant) = ical::time::parse_ical_time(recurrence)
        .map(|t| ical::time::to_utc(t, None, default_tz))
    else {
        return Ok(PropstatResponse::gone(href.to_string()));
    };

    let found = ical::Component::parse(&object.data).ok().and_then(|root| {
        let event = root.primary_component()?;
        let times = recurrence_times(event, default_tz)?;
        let occurrences = recurrence::expand(
            &times,
            instant - TimeDelta::hours(24),
            instant + TimeDelta::hours(24),
        )
        .ok()?;
        let occurrence = occurrences
            .into_iter()
            .find(|o| o.recurrence_id() == recurrence)?;
        Some(
            recurrence::materialize_instance(&root, event, &times, &occurrence).serialize(),
        )
    });

    Ok(match found {
        Some(data) => {
            let instance_uid = format!("{master_uid}-{recurrence}");
            PropstatResponse::with_propstat(
                href.to_string(),
                Propstat::ok(object_properties(
                    requested,
                    &instance_uid,
                    Some(&data),
                    object.updated_at,
                )),
            )
        }
        None => PropstatResponse::gone(href.to_string()),
    })
}

fn recurrence_times(event: &ical::Component, default_tz: ChronoTz) -> Option<EventTimes> {
    recurrence::extract_event_times(event, default_tz)
}

/// ## Summary
/// Executes a sync-collection report: changes after the presented token,
/// deleted members as bare 404 responses, live members with their
/// requested properties, and the resulting token at the top level. A page
/// cut short by the client's limit re-tokenizes at the last returned
/// change and sets `number-of-matches-within-limits`.
///
/// ## Errors
/// Propagates store failures.
pub async fn sync_collection(
    ctx: &ReportContext<'_>,
    calendar: &Calendar,
    request: &SyncCollection,
) -> ServiceResult<Multistatus> {
    let since = parse_sync_token(&request.sync_token);
    let page = ctx
        .store
        .list_changes_since(calendar.id, since, request.limit.map(|l| l as usize))
        .await?;

    let mut responses = Vec::new();
    for change in &page.changes {
        let href = path::href::object(ctx.base_prefix, ctx.collection, &change.uid);
        if change.deleted {
            responses.push(PropstatResponse::gone(href));
            continue;
        }
        // The object may have vanished between the change read and this
        // fetch; fall back to a 404 member in that case.
        match ctx.store.get_calendar_object(calendar.id, &change.uid).await? {
            Some(object) => responses.push(PropstatResponse::with_propstat(
                href,
                Propstat::ok(object_properties(
                    &request.properties,
                    &object.etag,
                    Some(&object.data),
                    object.updated_at,
                )),
            )),
            None => responses.push(PropstatResponse::gone(href)),
        }
    }

    let token_seq = if page.truncated {
        page.changes.last().map_or(page.current_seq, |c| c.seq)
    } else {
        page.current_seq
    };

    let mut multistatus = Multistatus::new(responses);
    multistatus.sync_token = Some(format_sync_token(token_seq));
    multistatus.matches_within_limits = page.truncated;
    Ok(multistatus)
}

/// ## Summary
/// Executes a free-busy-query over one calendar: expands overlapping
/// VEVENTs, merges the busy intervals, and renders the VFREEBUSY body.
///
/// ## Errors
/// `BadRequest` when the range is unbounded.
pub async fn free_busy_query(
    ctx: &ReportContext<'_>,
    calendar: &Calendar,
    range: TimeRange,
) -> ServiceResult<String> {
    let (Some(start), Some(end)) = (range.start, range.end) else {
        return Err(ServiceError::BadRequest(
            "free-busy-query requires a bounded time-range".to_string(),
        ));
    };

    let busy = busy_for_calendars(ctx.store, &[calendar.id], start, end, ctx.default_tz).await?;
    Ok(freebusy::render_vfreebusy(start, end, &busy, None, None))
}

/// ## Summary
/// Collects merged busy intervals across a set of calendars, expanding
/// recurring VEVENTs within the window. Unparseable objects are skipped.
///
/// ## Errors
/// Propagates store failures.
pub async fn busy_for_calendars(
    store: &dyn Store,
    calendar_ids: &[uuid::Uuid],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    default_tz: ChronoTz,
) -> ServiceResult<Vec<BusyInterval>> {
    let mut intervals = Vec::new();

    for calendar_id in calendar_ids {
        let objects = store.list_calendar_objects(*calendar_id).await?;
        for object in objects {
            if object.component != ComponentKind::Event {
                continue;
            }
            let Ok(root) = ical::Component::parse(&object.data) else {
                continue;
            };
            let Some(event) = root.primary_component() else {
                continue;
            };
            let Some(times) = recurrence::extract_event_times(event, default_tz) else {
                continue;
            };
            let Ok(occurrences) = recurrence::expand(&times, range_start, range_end) else {
                continue;
            };
            intervals.extend(occurrences.iter().map(|o| BusyInterval {
                start: o.start.max(range_start),
                end: o.end.min(range_end),
            }));
        }
    }

    Ok(freebusy::merge_busy(intervals))
}

/// ## Summary
/// Merged busy intervals across every calendar a user owns; the Outbox
/// free-busy aggregation runs on this.
///
/// ## Errors
/// Propagates store failures.
pub async fn busy_for_user(
    store: &dyn Store,
    owner_uid: &str,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    default_tz: ChronoTz,
) -> ServiceResult<Vec<BusyInterval>> {
    let ids: Vec<uuid::Uuid> = store
        .list_calendars(owner_uid)
        .await?
        .iter()
        .map(|c| c.id)
        .collect();
    busy_for_calendars(store, &ids, range_start, range_end, default_tz).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kunai_core::path::ResourceKind;
    use kunai_store::MemoryStore;
    use kunai_store::memory::new_calendar;
    use kunai_store::model::CalendarObjectUpsert;

    fn collection_ref() -> CollectionRef {
        CollectionRef {
            kind: ResourceKind::Calendar,
            owner: "alice".to_string(),
            uri: "work".to_string(),
            shared: false,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("timestamp")
    }

    async fn seed_event(store: &MemoryStore, calendar: &Calendar, uid: &str, lines: &[&str]) {
        let data = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20250101T000000Z\r\n{}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
            lines.join("\r\n")
        );
        store
            .put_calendar_object(CalendarObjectUpsert {
                calendar_id: calendar.id,
                uid: uid.to_string(),
                component: ComponentKind::Event,
                data,
                start_at: None,
                end_at: None,
            })
            .await
            .expect("seed");
    }

    #[tokio::test]
    async fn query_expands_recurring_event_into_instances() {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("alice", "work", None))
            .await
            .expect("create");
        seed_event(
            &store,
            &calendar,
            "evt1",
            &[
                "DTSTART:20250101T100000Z",
                "DTEND:20250101T110000Z",
                "RRULE:FREQ=DAILY;COUNT=5",
            ],
        )
        .await;

        let cref = collection_ref();
        let ctx = ReportContext {
            store: &store,
            base_prefix: "/dav",
            collection: &cref,
            default_tz: chrono_tz::UTC,
        };
        let query = CalendarQuery {
            properties: vec![],
            components: vec!["VEVENT".to_string()],
            time_range: Some(TimeRange {
                start: Some(utc(2025, 1, 1, 0)),
                end: Some(utc(2025, 1, 6, 0)),
            }),
        };
        let ms = calendar_query(&ctx, &calendar, &query).await.expect("query");
        assert_eq!(ms.responses.len(), 5);
        assert!(
            ms.responses
                .iter()
                .all(|r| r.href.ends_with("Z.ics") && r.href.contains("evt1-2025010"))
        );
    }

    #[tokio::test]
    async fn query_returns_master_for_non_recurring() {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("alice", "work", None))
            .await
            .expect("create");
        seed_event(
            &store,
            &calendar,
            "evt1",
            &["DTSTART:20250101T100000Z", "DTEND:20250101T110000Z"],
        )
        .await;

        let cref = collection_ref();
        let ctx = ReportContext {
            store: &store,
            base_prefix: "/dav",
            collection: &cref,
            default_tz: chrono_tz::UTC,
        };
        let query = CalendarQuery {
            properties: vec![],
            components: vec!["VEVENT".to_string()],
            time_range: Some(TimeRange {
                start: Some(utc(2025, 1, 1, 0)),
                end: Some(utc(2025, 1, 2, 0)),
            }),
        };
        let ms = calendar_query(&ctx, &calendar, &query).await.expect("query");
        assert_eq!(ms.responses.len(), 1);
        assert_eq!(ms.responses[0].href, "/dav/calendars/alice/work/evt1.ics");

        // Outside the window nothing matches.
        let query = CalendarQuery {
            time_range: Some(TimeRange {
                start: Some(utc(2025, 2, 1, 0)),
                end: Some(utc(2025, 2, 2, 0)),
            }),
            ..query
        };
        let ms = calendar_query(&ctx, &calendar, &query).await.expect("query");
        assert!(ms.responses.is_empty());
    }

    #[tokio::test]
    async fn multiget_resolves_instance_identifiers() {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("alice", "work", None))
            .await
            .expect("create");
        seed_event(
            &store,
            &calendar,
            "evt1",
            &[
                "DTSTART:20250101T100000Z",
                "DTEND:20250101T110000Z",
                "RRULE:FREQ=DAILY;COUNT=5",
            ],
        )
        .await;

        let multiget = Multiget {
            properties: vec![],
            hrefs: vec![
                "/dav/calendars/alice/work/evt1-20250103T100000Z.ics".to_string(),
                "/dav/calendars/alice/work/missing.ics".to_string(),
            ],
        };
        let ms = calendar_multiget(&store, "/dav", chrono_tz::UTC, &multiget)
            .await
            .expect("multiget");
        assert_eq!(ms.responses.len(), 2);

        let instance = &ms.responses[0];
        assert!(instance.status.is_none());
        let data = instance.propstats[0]
            .properties
            .iter()
            .find_map(|p| match &p.value {
                Some(PropertyValue::ContentData(d)) => Some(d.clone()),
                _ => None,
            })
            .expect("calendar-data");
        assert!(data.contains("RECURRENCE-ID:20250103T100000Z"));

        assert!(ms.responses[1].status.is_some());
    }

    #[tokio::test]
    async fn sync_collection_pages_and_tokens() {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("alice", "work", None))
            .await
            .expect("create");
        for i in 0..3 {
            seed_event(
                &store,
                &calendar,
                &format!("e{i}"),
                &["DTSTART:20250101T100000Z", "DTEND:20250101T110000Z"],
            )
            .await;
        }
        store
            .delete_calendar_object(calendar.id, "e0")
            .await
            .expect("delete");

        let cref = collection_ref();
        let ctx = ReportContext {
            store: &store,
            base_prefix: "/dav",
            collection: &cref,
            default_tz: chrono_tz::UTC,
        };

        let ms = sync_collection(
            &ctx,
            &calendar,
            &SyncCollection {
                sync_token: String::new(),
                limit: None,
                properties: vec![],
            },
        )
        .await
        .expect("sync");
        assert_eq!(ms.responses.len(), 4);
        assert_eq!(ms.sync_token.as_deref(), Some("seq:4"));
        let deleted: Vec<_> = ms.responses.iter().filter(|r| r.status.is_some()).collect();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].href.ends_with("/e0.ics"));

        // Freshest token: empty list, same token back.
        let ms = sync_collection(
            &ctx,
            &calendar,
            &SyncCollection {
                sync_token: "seq:4".to_string(),
                limit: None,
                properties: vec![],
            },
        )
        .await
        .expect("sync idempotent");
        assert!(ms.responses.is_empty());
        assert_eq!(ms.sync_token.as_deref(), Some("seq:4"));
        assert!(!ms.matches_within_limits);

        // A limited page re-tokenizes at the last returned change.
        let ms = sync_collection(
            &ctx,
            &calendar,
            &SyncCollection {
                sync_token: String::new(),
                limit: Some(2),
                properties: vec![],
            },
        )
        .await
        .expect("sync limited");
        assert_eq!(ms.responses.len(), 2);
        assert!(ms.matches_within_limits);
        assert_eq!(ms.sync_token.as_deref(), Some("seq:2"));

        // Garbage tokens mean full resync.
        let ms = sync_collection(
            &ctx,
            &calendar,
            &SyncCollection {
                sync_token: "opaque-foreign-token".to_string(),
                limit: None,
                properties: vec![],
            },
        )
        .await
        .expect("sync resync");
        assert_eq!(ms.responses.len(), 4);
    }

    #[tokio::test]
    async fn free_busy_merges_across_events() {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("bob", "personal", None))
            .await
            .expect("create");
        seed_event(
            &store,
            &calendar,
            "a",
            &["DTSTART:20250101T090000Z", "DTEND:20250101T103000Z"],
        )
        .await;
        seed_event(
            &store,
            &calendar,
            "b",
            &["DTSTART:20250101T100000Z", "DTEND:20250101T110000Z"],
        )
        .await;
        seed_event(
            &store,
            &calendar,
            "c",
            &["DTSTART:20250101T140000Z", "DTEND:20250101T150000Z"],
        )
        .await;

        let busy = busy_for_user(&store, "bob", utc(2025, 1, 1, 0), utc(2025, 1, 2, 0), chrono_tz::UTC)
            .await
            .expect("busy");
        assert_eq!(busy.len(), 2);
        assert_eq!(busy[0].start, utc(2025, 1, 1, 9));
        assert_eq!(busy[0].end, utc(2025, 1, 1, 11));
    }
}
