//! REPORT method handler: dispatches on the parsed report type and the
//! routed collection.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use kunai_core::constants::{CALENDAR_CONTENT_TYPE, DIRECTORY_BOOK_PREFIX};
use kunai_core::path::{self, CollectionRef, DavPath, ResourceKind};
use kunai_rfc::dav::multistatus::{Multistatus, Propstat, PropstatResponse};
use kunai_rfc::dav::parse::report::parse_report;
use kunai_rfc::dav::property::{DavProperty, PropertyValue};
use kunai_rfc::dav::report::{Multiget, ReportRequest};
use kunai_rfc::error::RfcError;
use kunai_service::carddav::report::card_matches;
use kunai_service::error::ServiceError;

use kunai_service::directory::Directory;

use super::{
    RequestContext, read_addressbook_or_error, read_body, read_calendar_or_error, request_context,
    write_error, write_multistatus,
};

#[handler]
#[tracing::instrument(skip_all, fields(method = "REPORT", path = %req.uri().path()))]
pub async fn report(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let Some(body) = read_body(req, res).await else {
        return;
    };

    let request = match parse_report(&body) {
        Ok(request) => request,
        Err(RfcError::UnsupportedReport(name)) => {
            tracing::debug!(report = %name, "unsupported report root");
            res.status_code(StatusCode::BAD_REQUEST);
            res.body("unsupported report".to_string());
            return;
        }
        Err(e) => {
            tracing::debug!(error = %e, "malformed REPORT body");
            res.status_code(StatusCode::BAD_REQUEST);
            return;
        }
    };

    match ctx.path.clone() {
        DavPath::Collection(collection) => match collection.kind {
            ResourceKind::Calendar => calendar_report(&ctx, res, &collection, &request).await,
            ResourceKind::Addressbook => addressbook_report(&ctx, res, &collection, &request).await,
        },
        _ => {
            res.status_code(StatusCode::BAD_REQUEST);
            res.body("REPORT targets a collection".to_string());
        }
    }
}

/// Per-href access filter for multigets: hrefs the requester may not read
/// degrade to 404 members instead of leaking data.
async fn authorize_multiget(
    ctx: &RequestContext,
    multiget: &Multiget,
) -> (Multiget, Vec<PropstatResponse>) {
    let mut allowed = Multiget {
        properties: multiget.properties.clone(),
        hrefs: Vec::new(),
    };
    let mut denied = Vec::new();

    for href in &multiget.hrefs {
        let readable = match path::parse(ctx.base_prefix(), href) {
            Ok(DavPath::Object { collection, .. }) => {
                let owner_uri = match collection.kind {
                    ResourceKind::Calendar => kunai_service::caldav::resolve_calendar(
                        ctx.state.store.as_ref(),
                        &collection,
                    )
                    .await
                    .ok()
                    .flatten()
                    .map(|c| (c.owner_uid, c.uri)),
                    ResourceKind::Addressbook => kunai_service::carddav::resolve_addressbook(
                        ctx.state.store.as_ref(),
                        &collection,
                    )
                    .await
                    .ok()
                    .flatten()
                    .map(|b| (b.owner_uid, b.uri)),
                };
                match owner_uri {
                    Some((owner, uri)) => ctx.require_read(&owner, &uri).await.is_ok(),
                    None => true,
                }
            }
            _ => true,
        };
        if readable {
            allowed.hrefs.push(href.clone());
        } else {
            denied.push(PropstatResponse::gone(href.clone()));
        }
    }
    (allowed, denied)
}

async fn calendar_report(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    request: &ReportRequest,
) {
    // Multiget authorizes per href; everything else needs read access on
    // the addressed collection.
    if let ReportRequest::CalendarMultiget(multiget) = request {
        let (allowed, mut denied) = authorize_multiget(ctx, multiget).await;
        match kunai_service::caldav::report::calendar_multiget(
            ctx.state.store.as_ref(),
            ctx.base_prefix(),
            ctx.state.settings.dav.server_tz(),
            &allowed,
        )
        .await
        {
            Ok(mut multistatus) => {
                multistatus.responses.append(&mut denied);
                write_multistatus(res, &multistatus);
            }
            Err(err) => write_error(res, &err),
        }
        return;
    }

    let Some((calendar, _)) = read_calendar_or_error(ctx, collection, res).await else {
        return;
    };
    let report_ctx = kunai_service::caldav::report::ReportContext {
        store: ctx.state.store.as_ref(),
        base_prefix: ctx.base_prefix(),
        collection,
        default_tz: ctx.state.settings.dav.server_tz(),
    };

    match request {
        ReportRequest::CalendarQuery(query) => {
            match kunai_service::caldav::report::calendar_query(&report_ctx, &calendar, query).await
            {
                Ok(multistatus) => write_multistatus(res, &multistatus),
                Err(err) => write_error(res, &err),
            }
        }
        ReportRequest::SyncCollection(sync) => {
            match kunai_service::caldav::report::sync_collection(&report_ctx, &calendar, sync).await
            {
                Ok(multistatus) => write_multistatus(res, &multistatus),
                Err(err) => write_error(res, &err),
            }
        }
        ReportRequest::FreeBusyQuery(range) => {
            match kunai_service::caldav::report::free_busy_query(&report_ctx, &calendar, *range)
                .await
            {
                Ok(body) => {
                    #[expect(
                        clippy::let_underscore_must_use,
                        reason = "Header addition failure is non-fatal"
                    )]
                    let _ = res.add_header(
                        "Content-Type",
                        HeaderValue::from_static(CALENDAR_CONTENT_TYPE),
                        true,
                    );
                    res.status_code(StatusCode::OK);
                    res.body(body);
                }
                Err(err) => write_error(res, &err),
            }
        }
        ReportRequest::AddressbookQuery(_) | ReportRequest::AddressbookMultiget(_) => {
            res.status_code(StatusCode::BAD_REQUEST);
            res.body("addressbook report on a calendar collection".to_string());
        }
        ReportRequest::CalendarMultiget(_) => unreachable!("handled above"),
    }
}

async fn addressbook_report(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    request: &ReportRequest,
) {
    if collection.uri.starts_with(DIRECTORY_BOOK_PREFIX) {
        directory_book_report(ctx, res, collection, request).await;
        return;
    }

    if let ReportRequest::AddressbookMultiget(multiget) = request {
        let (allowed, mut denied) = authorize_multiget(ctx, multiget).await;
        match kunai_service::carddav::report::addressbook_multiget(
            ctx.state.store.as_ref(),
            ctx.base_prefix(),
            &allowed,
        )
        .await
        {
            Ok(mut multistatus) => {
                multistatus.responses.append(&mut denied);
                write_multistatus(res, &multistatus);
            }
            Err(err) => write_error(res, &err),
        }
        return;
    }

    let Some((addressbook, _)) = read_addressbook_or_error(ctx, collection, res).await else {
        return;
    };
    let report_ctx = kunai_service::carddav::report::ReportContext {
        store: ctx.state.store.as_ref(),
        base_prefix: ctx.base_prefix(),
        collection,
    };

    match request {
        ReportRequest::AddressbookQuery(query) => {
            match kunai_service::carddav::report::addressbook_query(
                &report_ctx,
                &addressbook,
                query,
            )
            .await
            {
                Ok(multistatus) => write_multistatus(res, &multistatus),
                Err(err) => write_error(res, &err),
            }
        }
        ReportRequest::SyncCollection(sync) => {
            match kunai_service::carddav::report::sync_collection(&report_ctx, &addressbook, sync)
                .await
            {
                Ok(multistatus) => write_multistatus(res, &multistatus),
                Err(err) => write_error(res, &err),
            }
        }
        _ => {
            res.status_code(StatusCode::BAD_REQUEST);
            res.body("calendar report on an address-book collection".to_string());
        }
    }
}

/// Directory-backed books run query/multiget against the directory; they
/// carry no change log, so sync-collection is refused.
async fn directory_book_report(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    request: &ReportRequest,
) {
    match request {
        ReportRequest::AddressbookQuery(query) => {
            let contacts = match ctx.state.directory.list_contacts(&collection.uri).await {
                Ok(contacts) => contacts,
                Err(err) => {
                    write_error(res, &err);
                    return;
                }
            };
            let mut responses = Vec::new();
            for contact in contacts {
                if let Some(limit) = query.limit {
                    if responses.len() >= limit as usize {
                        break;
                    }
                }
                let Ok(cards) = kunai_rfc::vcard::parse_cards(&contact.data) else {
                    continue;
                };
                if !cards
                    .iter()
                    .any(|card| card_matches(card, &query.prop_filters, query.any_of))
                {
                    continue;
                }
                let href = path::href::object(ctx.base_prefix(), collection, &contact.uid);
                responses.push(directory_contact_response(href, &contact));
            }
            write_multistatus(res, &Multistatus::new(responses));
        }
        ReportRequest::AddressbookMultiget(multiget) => {
            let mut responses = Vec::new();
            for href in &multiget.hrefs {
                let Ok(DavPath::Object { uid, .. }) = path::parse(ctx.base_prefix(), href) else {
                    responses.push(PropstatResponse::gone(href.clone()));
                    continue;
                };
                match ctx.state.directory.get_contact(&collection.uri, &uid).await {
                    Ok(Some(contact)) => {
                        responses.push(directory_contact_response(href.clone(), &contact));
                    }
                    Ok(None) => responses.push(PropstatResponse::gone(href.clone())),
                    Err(err) => {
                        write_error(res, &err);
                        return;
                    }
                }
            }
            write_multistatus(res, &Multistatus::new(responses));
        }
        _ => write_error(
            res,
            &ServiceError::Forbidden(
                "directory-backed address books do not support this report".to_string(),
            ),
        ),
    }
}

fn directory_contact_response(
    href: String,
    contact: &kunai_service::directory::DirectoryContact,
) -> PropstatResponse {
    PropstatResponse::with_propstat(
        href,
        Propstat::ok(vec![
            DavProperty::text(
                kunai_rfc::dav::QName::dav("getetag"),
                format!("\"{}\"", contact.etag),
            ),
            DavProperty::with_value(
                kunai_rfc::dav::QName::carddav("address-data"),
                PropertyValue::ContentData(contact.data.clone()),
            ),
        ]),
    )
}
