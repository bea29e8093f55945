//! iTIP scheduling (RFC 6638 §8).
//!
//! An Outbox POST carries `text/calendar` with a METHOD and either a
//! VFREEBUSY (free-busy request) or a VEVENT (invitation traffic):
//!
//! - `REQUEST` + VFREEBUSY — per-recipient free-busy aggregation across
//!   all of the recipient's calendars.
//! - `REQUEST`/`CANCEL` + VEVENT — delivery into each local recipient's
//!   scheduling inbox as a pending [`SchedulingObject`].
//! - `REPLY` + VEVENT — recorded as an [`AttendeeResponse`] keyed by
//!   event UID and attendee email.
//!
//! Any other method is not implemented. Per-recipient failures produce a
//! `5.1` request-status without aborting the rest of the response.

use chrono::{DateTime, Utc};
use chrono_tz::Tz as ChronoTz;

use kunai_rfc::dav::build::schedule::ScheduleResponse;
use kunai_rfc::ical::{self, Component};
use kunai_store::Store;
use kunai_store::memory::new_scheduling_object;
use kunai_store::model::{AttendeeResponse, FreeBusyCacheEntry};

use crate::caldav::{freebusy, report::busy_for_user};
use crate::directory::{Directory, DirectoryUser};
use crate::error::{ServiceError, ServiceResult};

/// A parsed Outbox POST.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub method: String,
    pub originator: String,
    pub recipients: Vec<String>,
    calendar: Component,
    raw: String,
}

/// What the Outbox handler should do with a parsed message.
#[derive(Debug)]
pub enum OutboxOutcome {
    /// A `C:schedule-response` document.
    ScheduleResponses(Vec<ScheduleResponse>),
    /// The iTIP method is not supported (501).
    NotImplemented(String),
}

/// Splits `Recipient:` header values (repeated or comma-separated,
/// angle brackets tolerated) into calendar user addresses.
#[must_use]
pub fn parse_recipients(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .flat_map(|value| value.split(','))
        .map(|addr| addr.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|addr| !addr.is_empty())
        .collect()
}

/// The bare address of a `mailto:` calendar user address.
#[must_use]
pub fn email_of(caladdr: &str) -> &str {
    caladdr.strip_prefix("mailto:").unwrap_or(caladdr)
}

/// ## Summary
/// Parses an Outbox POST body plus its `Originator:`/`Recipient:`
/// headers.
///
/// ## Errors
/// `BadRequest` for unparseable bodies, a missing METHOD, or a missing
/// originator/recipient.
pub fn parse_outbox_message(
    body: &str,
    originator: Option<&str>,
    recipient_headers: &[String],
) -> ServiceResult<OutboxMessage> {
    let calendar =
        Component::parse(body).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
    if calendar.name != "VCALENDAR" {
        return Err(ServiceError::BadRequest("expected VCALENDAR".to_string()));
    }
    let method = calendar
        .property("METHOD")
        .map(|p| p.value.trim().to_ascii_uppercase())
        .ok_or_else(|| ServiceError::BadRequest("missing METHOD".to_string()))?;

    let originator = originator
        .map(|o| o.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|o| !o.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing Originator header".to_string()))?;

    let recipients = parse_recipients(recipient_headers);
    if recipients.is_empty() {
        return Err(ServiceError::BadRequest("missing Recipient header".to_string()));
    }

    Ok(OutboxMessage {
        method,
        originator,
        recipients,
        calendar,
        raw: body.to_string(),
    })
}

/// ## Summary
/// Dispatches a parsed Outbox message.
///
/// ## Errors
/// `BadRequest` for structurally invalid messages; per-recipient
/// directory or store failures degrade to `5.1` statuses instead of
/// erroring.
pub async fn process_outbox(
    store: &dyn Store,
    directory: &dyn Directory,
    message: &OutboxMessage,
    default_tz: ChronoTz,
) -> ServiceResult<OutboxOutcome> {
    match message.method.as_str() {
        "REQUEST" if message.calendar.child("VFREEBUSY").is_some() => {
            free_busy_request(store, directory, message, default_tz).await
        }
        "REQUEST" | "CANCEL" if message.calendar.child("VEVENT").is_some() => {
            deliver_invitation(store, directory, message).await
        }
        "REPLY" if message.calendar.child("VEVENT").is_some() => {
            record_reply(store, directory, message).await
        }
        other => Ok(OutboxOutcome::NotImplemented(other.to_string())),
    }
}

async fn free_busy_request(
    store: &dyn Store,
    directory: &dyn Directory,
    message: &OutboxMessage,
    default_tz: ChronoTz,
) -> ServiceResult<OutboxOutcome> {
    let vfreebusy = message
        .calendar
        .child("VFREEBUSY")
        .ok_or_else(|| ServiceError::BadRequest("missing VFREEBUSY".to_string()))?;
    let range_start = freebusy_bound(vfreebusy, "DTSTART", default_tz)?;
    let range_end = freebusy_bound(vfreebusy, "DTEND", default_tz)?;

    let mut responses = Vec::new();
    for recipient in &message.recipients {
        responses.push(
            free_busy_for_recipient(
                store,
                directory,
                message,
                recipient,
                range_start,
                range_end,
                default_tz,
            )
            .await,
        );
    }
    Ok(OutboxOutcome::ScheduleResponses(responses))
}

fn freebusy_bound(
    vfreebusy: &Component,
    name: &str,
    default_tz: ChronoTz,
) -> ServiceResult<DateTime<Utc>> {
    vfreebusy
        .property(name)
        .and_then(|p| ical::time::property_to_utc(p, default_tz))
        .ok_or_else(|| ServiceError::BadRequest(format!("VFREEBUSY missing {name}")))
}

async fn free_busy_for_recipient(
    store: &dyn Store,
    directory: &dyn Directory,
    message: &OutboxMessage,
    recipient: &str,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    default_tz: ChronoTz,
) -> ScheduleResponse {
    let user = match directory.lookup_user_by_attr("mail", email_of(recipient)).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return ScheduleResponse {
                recipient: recipient.to_string(),
                request_status: ScheduleResponse::STATUS_INVALID_USER.to_string(),
                calendar_data: None,
            };
        }
        Err(e) => {
            tracing::warn!(recipient, error = %e, "directory lookup failed for free-busy");
            return ScheduleResponse {
                recipient: recipient.to_string(),
                request_status: ScheduleResponse::STATUS_UNAVAILABLE.to_string(),
                calendar_data: None,
            };
        }
    };

    match busy_for_user(store, &user.uid, range_start, range_end, default_tz).await {
        Ok(busy) => {
            let data = freebusy::render_vfreebusy(
                range_start,
                range_end,
                &busy,
                Some(&message.originator),
                Some(recipient),
            );
            if let Err(e) = store
                .put_free_busy_cache(FreeBusyCacheEntry {
                    user_uid: user.uid.clone(),
                    range_start,
                    range_end,
                    data: data.clone(),
                    computed_at: Utc::now(),
                })
                .await
            {
                tracing::warn!(user = %user.uid, error = %e, "free-busy cache write failed");
            }
            ScheduleResponse {
                recipient: recipient.to_string(),
                request_status: ScheduleResponse::STATUS_SUCCESS.to_string(),
                calendar_data: Some(data),
            }
        }
        Err(e) => {
            tracing::warn!(recipient, error = %e, "free-busy aggregation failed");
            ScheduleResponse {
                recipient: recipient.to_string(),
                request_status: ScheduleResponse::STATUS_UNAVAILABLE.to_string(),
                calendar_data: None,
            }
        }
    }
}

async fn deliver_invitation(
    store: &dyn Store,
    directory: &dyn Directory,
    message: &OutboxMessage,
) -> ServiceResult<OutboxOutcome> {
    let event = message
        .calendar
        .child("VEVENT")
        .ok_or_else(|| ServiceError::BadRequest("missing VEVENT".to_string()))?;
    let event_uid = event
        .property("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| ServiceError::BadRequest("VEVENT missing UID".to_string()))?;

    let mut responses = Vec::new();
    for recipient in &message.recipients {
        let response = match directory
            .lookup_user_by_attr("mail", email_of(recipient))
            .await
        {
            Ok(Some(user)) => {
                let object = new_scheduling_object(
                    &user.uid,
                    &event_uid,
                    message.raw.clone(),
                    &message.method,
                    &message.originator,
                    recipient,
                );
                match store.put_scheduling_object(object).await {
                    Ok(()) => ScheduleResponse {
                        recipient: recipient.to_string(),
                        request_status: ScheduleResponse::STATUS_SUCCESS.to_string(),
                        calendar_data: None,
                    },
                    Err(e) => {
                        tracing::warn!(recipient, error = %e, "inbox delivery failed");
                        ScheduleResponse {
                            recipient: recipient.to_string(),
                            request_status: ScheduleResponse::STATUS_UNAVAILABLE.to_string(),
                            calendar_data: None,
                        }
                    }
                }
            }
            Ok(None) => ScheduleResponse {
                recipient: recipient.to_string(),
                request_status: ScheduleResponse::STATUS_INVALID_USER.to_string(),
                calendar_data: None,
            },
            Err(e) => {
                tracing::warn!(recipient, error = %e, "directory lookup failed for delivery");
                ScheduleResponse {
                    recipient: recipient.to_string(),
                    request_status: ScheduleResponse::STATUS_UNAVAILABLE.to_string(),
                    calendar_data: None,
                }
            }
        };
        responses.push(response);
    }
    Ok(OutboxOutcome::ScheduleResponses(responses))
}

async fn record_reply(
    store: &dyn Store,
    directory: &dyn Directory,
    message: &OutboxMessage,
) -> ServiceResult<OutboxOutcome> {
    let event = message
        .calendar
        .child("VEVENT")
        .ok_or_else(|| ServiceError::BadRequest("missing VEVENT".to_string()))?;
    let event_uid = event
        .property("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| ServiceError::BadRequest("VEVENT missing UID".to_string()))?;

    let attendee = event.property("ATTENDEE");
    let attendee_email = attendee
        .map(|p| email_of(&p.value).to_string())
        .unwrap_or_else(|| email_of(&message.originator).to_string());
    let part_stat = attendee
        .and_then(|p| p.param("PARTSTAT"))
        .unwrap_or("NEEDS-ACTION")
        .to_string();

    store
        .record_attendee_response(AttendeeResponse {
            event_uid,
            attendee_email,
            part_stat,
            responded_at: Utc::now(),
        })
        .await?;

    let mut responses = Vec::new();
    for recipient in &message.recipients {
        let status = match directory
            .lookup_user_by_attr("mail", email_of(recipient))
            .await
        {
            Ok(Some(_)) => ScheduleResponse::STATUS_SUCCESS,
            Ok(None) => ScheduleResponse::STATUS_INVALID_USER,
            Err(_) => ScheduleResponse::STATUS_UNAVAILABLE,
        };
        responses.push(ScheduleResponse {
            recipient: recipient.to_string(),
            request_status: status.to_string(),
            calendar_data: None,
        });
    }
    Ok(OutboxOutcome::ScheduleResponses(responses))
}

/// ## Summary
/// Authorizes an Outbox POST: only the owner of the outbox may originate
/// scheduling messages through it.
///
/// ## Errors
/// `Forbidden` when the authenticated user is not the outbox owner.
pub fn require_outbox_owner(owner_uid: &str, user: &DirectoryUser) -> ServiceResult<()> {
    if owner_uid == user.uid {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "outbox of {owner_uid} is not writable by {}",
            user.uid
        )))
    }
}
