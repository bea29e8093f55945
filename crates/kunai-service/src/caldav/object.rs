//! The conditional write pipeline for calendar objects.
//!
//! PUT runs validate → preconditions → normalize → upsert; the store fuses
//! the upsert with the change-log append and CTag bump.

use chrono::Utc;
use chrono_tz::Tz;

use kunai_rfc::ical;
use kunai_store::Store;
use kunai_store::model::{Calendar, CalendarObject, CalendarObjectUpsert, ComponentKind};

use crate::auth::Effective;
use crate::error::{ServiceError, ServiceResult};

/// How the requester reaches the collection: as its owner, or through a
/// shared mount with an effective privilege set.
#[derive(Debug, Clone, Copy)]
pub enum WriteAccess {
    Owner,
    Shared(Effective),
}

impl WriteAccess {
    fn may_create(self) -> bool {
        match self {
            Self::Owner => true,
            Self::Shared(effective) => effective.bind,
        }
    }

    fn may_update(self) -> bool {
        match self {
            Self::Owner => true,
            Self::Shared(effective) => effective.write_content,
        }
    }

    fn may_delete(self) -> bool {
        match self {
            Self::Owner => true,
            Self::Shared(effective) => effective.unbind,
        }
    }
}

/// Conditional request headers, quotes untrimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preconditions<'a> {
    pub if_match: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
}

impl Preconditions<'_> {
    /// ## Summary
    /// Evaluates the conditional headers against the current ETag.
    /// `If-None-Match: *` fails when the resource exists; `If-Match`
    /// fails unless the (quote-trimmed) tag matches.
    ///
    /// ## Errors
    /// [`ServiceError::PreconditionFailed`] on any failed condition.
    pub fn check(&self, existing_etag: Option<&str>) -> ServiceResult<()> {
        if let Some(value) = self.if_none_match {
            let value = value.trim();
            if value == "*" {
                if existing_etag.is_some() {
                    return Err(ServiceError::PreconditionFailed);
                }
            } else if existing_etag == Some(trim_etag(value)) {
                return Err(ServiceError::PreconditionFailed);
            }
        }

        if let Some(value) = self.if_match {
            let value = value.trim();
            let matches = match existing_etag {
                Some(etag) => value == "*" || trim_etag(value) == etag,
                None => false,
            };
            if !matches {
                return Err(ServiceError::PreconditionFailed);
            }
        }

        Ok(())
    }
}

fn trim_etag(value: &str) -> &str {
    value.trim().trim_matches('"')
}

/// Result of a successful PUT.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub object: CalendarObject,
    pub created: bool,
}

/// ## Summary
/// PUT of a calendar object: size limits, component detection, DTSTAMP
/// synthesis, normalization, preconditions, and the fused upsert.
///
/// ## Errors
/// The full §7 taxonomy: `BadRequest` for empty/undecodable/malformed
/// payloads, `PayloadTooLarge` over the limit, `UnsupportedMediaType`
/// when no VEVENT/VTODO/VJOURNAL is present, `Forbidden` for missing
/// privileges, `PreconditionFailed` for failed conditionals.
pub async fn put_object(
    store: &dyn Store,
    calendar: &Calendar,
    uid: &str,
    body: &[u8],
    preconditions: Preconditions<'_>,
    access: WriteAccess,
    max_resource_size: usize,
    default_tz: Tz,
) -> ServiceResult<PutOutcome> {
    if body.is_empty() {
        return Err(ServiceError::BadRequest("empty calendar object".to_string()));
    }
    if body.len() > max_resource_size {
        return Err(ServiceError::PayloadTooLarge(body.len()));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| ServiceError::BadRequest("calendar object is not UTF-8".to_string()))?;

    // DTSTAMP synthesis happens on the raw text so the payload's newline
    // style carries through to normalization.
    let stamped = ical::ensure_dtstamp(text, Utc::now());

    let root = ical::Component::parse(&stamped)
        .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
    if root.name != "VCALENDAR" {
        return Err(ServiceError::BadRequest(format!(
            "expected VCALENDAR, got {}",
            root.name
        )));
    }
    let Some(primary) = root.primary_component() else {
        return Err(ServiceError::UnsupportedMediaType(
            "no VEVENT, VTODO, or VJOURNAL component".to_string(),
        ));
    };
    let component = ComponentKind::from_name(&primary.name).ok_or_else(|| {
        ServiceError::UnsupportedMediaType(primary.name.clone())
    })?;

    let existing = store.get_calendar_object(calendar.id, uid).await?;

    let allowed = if existing.is_some() {
        access.may_update()
    } else {
        access.may_create()
    };
    if !allowed {
        return Err(ServiceError::Forbidden(format!(
            "write to calendar {} denied",
            calendar.uri
        )));
    }

    preconditions.check(existing.as_ref().map(|o| o.etag.as_str()))?;

    let (start_at, end_at) = if component == ComponentKind::Event {
        let start = primary
            .property("DTSTART")
            .and_then(|p| ical::time::property_to_utc(p, default_tz));
        let end = primary
            .property("DTEND")
            .and_then(|p| ical::time::property_to_utc(p, default_tz));
        (start, end)
    } else {
        (None, None)
    };

    let normalized = root.serialize();
    let (object, created) = store
        .put_calendar_object(CalendarObjectUpsert {
            calendar_id: calendar.id,
            uid: uid.to_string(),
            component,
            data: normalized,
            start_at,
            end_at,
        })
        .await?;

    tracing::debug!(
        calendar = %calendar.uri,
        uid,
        created,
        etag = %object.etag,
        "calendar object stored"
    );

    Ok(PutOutcome { object, created })
}

/// ## Summary
/// DELETE of a calendar object: honors `If-Match`, requires `Unbind` for
/// shared access, and appends the deletion change.
///
/// ## Errors
/// `NotFound` for unknown UIDs, `Forbidden`, `PreconditionFailed`.
pub async fn delete_object(
    store: &dyn Store,
    calendar: &Calendar,
    uid: &str,
    preconditions: Preconditions<'_>,
    access: WriteAccess,
) -> ServiceResult<()> {
    if !access.may_delete() {
        return Err(ServiceError::Forbidden(format!(
            "delete from calendar {} denied",
            calendar.uri
        )));
    }

    let existing = store
        .get_calendar_object(calendar.id, uid)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("calendar object {uid}")))?;

    preconditions.check(Some(existing.etag.as_str()))?;

    store.delete_calendar_object(calendar.id, uid).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kunai_store::MemoryStore;
    use kunai_store::memory::new_calendar;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:evt1\r\nDTSTART:20250101T100000Z\r\nDTEND:20250101T110000Z\r\nSUMMARY:Test\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    async fn fixture() -> (MemoryStore, Calendar) {
        let store = MemoryStore::new();
        let calendar = store
            .create_calendar(new_calendar("alice", "work", None))
            .await
            .expect("create calendar");
        (store, calendar)
    }

    #[tokio::test]
    async fn put_creates_then_updates() {
        let (store, calendar) = fixture().await;

        let outcome = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("put");
        assert!(outcome.created);
        assert!(outcome.object.start_at.is_some());
        assert!(outcome.object.data.contains("DTSTAMP"));

        let outcome = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("re-put");
        assert!(!outcome.created);
    }

    #[tokio::test]
    async fn if_none_match_star_fails_on_existing() {
        let (store, calendar) = fixture().await;
        put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("put");

        let err = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions {
                if_none_match: Some("*"),
                ..Preconditions::default()
            },
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("precondition");
        assert!(matches!(err, ServiceError::PreconditionFailed));
    }

    #[tokio::test]
    async fn if_match_requires_matching_etag() {
        let (store, calendar) = fixture().await;
        let outcome = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("put");

        let quoted = format!("\"{}\"", outcome.object.etag);
        put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions {
                if_match: Some(&quoted),
                ..Preconditions::default()
            },
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("matching if-match");

        let err = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions {
                if_match: Some("\"stale\""),
                ..Preconditions::default()
            },
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("stale if-match");
        assert!(matches!(err, ServiceError::PreconditionFailed));
    }

    #[tokio::test]
    async fn shared_access_needs_bind_then_write_content() {
        let (store, calendar) = fixture().await;

        let no_bind = WriteAccess::Shared(Effective {
            read: true,
            ..Effective::default()
        });
        let err = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            no_bind,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("create without bind");
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let bind_only = WriteAccess::Shared(Effective {
            bind: true,
            ..Effective::default()
        });
        put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            bind_only,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("create with bind");

        // Updating now requires WriteContent, which bind alone lacks.
        let err = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            bind_only,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("update without write-content");
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejects_empty_oversize_and_foreign_components() {
        let (store, calendar) = fixture().await;

        let err = put_object(
            &store,
            &calendar,
            "x",
            b"",
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("empty");
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = put_object(
            &store,
            &calendar,
            "x",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            10,
            chrono_tz::UTC,
        )
        .await
        .expect_err("oversize");
        assert!(matches!(err, ServiceError::PayloadTooLarge(_)));

        let freebusy_only =
            "BEGIN:VCALENDAR\r\nBEGIN:VFREEBUSY\r\nEND:VFREEBUSY\r\nEND:VCALENDAR\r\n";
        let err = put_object(
            &store,
            &calendar,
            "x",
            freebusy_only.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect_err("unsupported component");
        assert!(matches!(err, ServiceError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn delete_honors_if_match_and_unbind() {
        let (store, calendar) = fixture().await;
        let outcome = put_object(
            &store,
            &calendar,
            "evt1",
            EVENT.as_bytes(),
            Preconditions::default(),
            WriteAccess::Owner,
            1 << 20,
            chrono_tz::UTC,
        )
        .await
        .expect("put");

        let err = delete_object(
            &store,
            &calendar,
            "evt1",
            Preconditions {
                if_match: Some("\"stale\""),
                ..Preconditions::default()
            },
            WriteAccess::Owner,
        )
        .await
        .expect_err("stale delete");
        assert!(matches!(err, ServiceError::PreconditionFailed));

        let err = delete_object(
            &store,
            &calendar,
            "evt1",
            Preconditions::default(),
            WriteAccess::Shared(Effective::default()),
        )
        .await
        .expect_err("no unbind");
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let quoted = format!("\"{}\"", outcome.object.etag);
        delete_object(
            &store,
            &calendar,
            "evt1",
            Preconditions {
                if_match: Some(&quoted),
                ..Preconditions::default()
            },
            WriteAccess::Owner,
        )
        .await
        .expect("delete");

        let err = delete_object(
            &store,
            &calendar,
            "evt1",
            Preconditions::default(),
            WriteAccess::Owner,
        )
        .await
        .expect_err("already gone");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
