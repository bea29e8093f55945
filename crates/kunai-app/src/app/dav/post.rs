//! POST method handler: scheduling Outbox only.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use kunai_core::constants::XML_CONTENT_TYPE;
use kunai_core::path::{DavPath, SchedulingBox};
use kunai_rfc::dav::build::serialize_schedule_response;
use kunai_service::scheduling::{self, OutboxOutcome};

use kunai_store::Store;
use super::{read_body, request_context, write_error};

/// ## Summary
/// Processes an Outbox POST (RFC 6638 §8): free-busy requests, invitation
/// delivery, and reply recording, dispatched by iTIP METHOD. POST
/// anywhere else is 405; unsupported methods are 501.
#[handler]
#[tracing::instrument(skip_all, fields(method = "POST", path = %req.uri().path()))]
pub async fn post(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let DavPath::Scheduling {
        owner,
        bin: SchedulingBox::Outbox,
    } = ctx.path.clone()
    else {
        res.status_code(StatusCode::METHOD_NOT_ALLOWED);
        return;
    };

    if let Err(err) = scheduling::require_outbox_owner(&owner, &ctx.principal) {
        write_error(res, &err);
        return;
    }
    if let Err(err) = ctx.state.store.ensure_scheduling_collections(&owner).await {
        write_error(res, &err.into());
        return;
    }

    let Some(body) = read_body(req, res).await else {
        return;
    };
    let Ok(text) = String::from_utf8(body) else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };

    let originator = req
        .headers()
        .get("Originator")
        .and_then(|v| v.to_str().ok());
    let recipients: Vec<String> = req
        .headers()
        .get_all("Recipient")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    let message = match scheduling::parse_outbox_message(&text, originator, &recipients) {
        Ok(message) => message,
        Err(err) => {
            write_error(res, &err);
            return;
        }
    };

    match scheduling::process_outbox(
        ctx.state.store.as_ref(),
        ctx.state.directory.as_ref(),
        &message,
        ctx.state.settings.dav.server_tz(),
    )
    .await
    {
        Ok(OutboxOutcome::ScheduleResponses(responses)) => {
            match serialize_schedule_response(&responses) {
                Ok(xml) => {
                    #[expect(
                        clippy::let_underscore_must_use,
                        reason = "Header addition failure is non-fatal"
                    )]
                    let _ = res.add_header(
                        "Content-Type",
                        HeaderValue::from_static(XML_CONTENT_TYPE),
                        true,
                    );
                    res.status_code(StatusCode::OK);
                    res.body(xml);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize schedule-response");
                    res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }
        Ok(OutboxOutcome::NotImplemented(method)) => {
            tracing::debug!(method, "unsupported iTIP method");
            res.status_code(StatusCode::NOT_IMPLEMENTED);
            res.body("only METHOD:REQUEST, CANCEL, and REPLY are supported".to_string());
        }
        Err(err) => write_error(res, &err),
    }
}
