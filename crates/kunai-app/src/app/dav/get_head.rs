//! GET and HEAD method handlers.
//!
//! Objects are served verbatim with their quoted ETag. A GET on a
//! calendar collection exports the whole calendar as one VCALENDAR.
//! Directory-backed address books serve their contacts straight from the
//! directory. HEAD mirrors GET without the body.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use kunai_core::constants::{CALENDAR_CONTENT_TYPE, DIRECTORY_BOOK_PREFIX, VCARD_CONTENT_TYPE};
use kunai_core::path::{CollectionRef, DavPath, ResourceKind, SchedulingBox};
use kunai_rfc::ical::{Component, Property};

use kunai_service::directory::Directory;
use kunai_store::Store;

use super::{
    RequestContext, read_addressbook_or_error, read_calendar_or_error, request_context, set_etag,
    write_error,
};

fn set_content_type(res: &mut Response, value: &'static str) {
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header("Content-Type", HeaderValue::from_static(value), true);
}

#[handler]
#[tracing::instrument(skip_all, fields(method = "GET", path = %req.uri().path()))]
pub async fn get(req: &mut Request, res: &mut Response, depot: &Depot) {
    serve(req, res, depot, true).await;
}

#[handler]
#[tracing::instrument(skip_all, fields(method = "HEAD", path = %req.uri().path()))]
pub async fn head(req: &mut Request, res: &mut Response, depot: &Depot) {
    serve(req, res, depot, false).await;
}

async fn serve(req: &mut Request, res: &mut Response, depot: &Depot, with_body: bool) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };

    match ctx.path.clone() {
        DavPath::Object { collection, uid } => {
            serve_object(&ctx, res, &collection, &uid, with_body).await;
        }
        DavPath::Collection(collection) if collection.kind == ResourceKind::Calendar => {
            serve_calendar_export(&ctx, res, &collection, with_body).await;
        }
        DavPath::SchedulingObject {
            owner,
            bin: SchedulingBox::Inbox,
            uid,
        } => serve_inbox_object(&ctx, res, &owner, &uid, with_body).await,
        DavPath::Root
        | DavPath::Principal { .. }
        | DavPath::Home { .. }
        | DavPath::Collection(_)
        | DavPath::Scheduling { .. }
        | DavPath::SchedulingObject { .. } => {
            res.status_code(StatusCode::NOT_FOUND);
        }
    }
}

async fn serve_object(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    uid: &str,
    with_body: bool,
) {
    match collection.kind {
        ResourceKind::Calendar => {
            let Some((calendar, _)) = read_calendar_or_error(ctx, collection, res).await else {
                return;
            };
            match ctx.state.store.get_calendar_object(calendar.id, uid).await {
                Ok(Some(object)) => {
                    set_content_type(res, CALENDAR_CONTENT_TYPE);
                    set_etag(res, &object.etag);
                    res.status_code(StatusCode::OK);
                    if with_body {
                        res.body(object.data);
                    }
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err.into()),
            }
        }
        ResourceKind::Addressbook => {
            if collection.uri.starts_with(DIRECTORY_BOOK_PREFIX) {
                serve_directory_contact(ctx, res, &collection.uri, uid, with_body).await;
                return;
            }
            let Some((addressbook, _)) = read_addressbook_or_error(ctx, collection, res).await
            else {
                return;
            };
            match ctx.state.store.get_contact(addressbook.id, uid).await {
                Ok(Some(contact)) => {
                    set_content_type(res, VCARD_CONTENT_TYPE);
                    set_etag(res, &contact.etag);
                    res.status_code(StatusCode::OK);
                    if with_body {
                        res.body(contact.data);
                    }
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err.into()),
            }
        }
    }
}

async fn serve_directory_contact(
    ctx: &RequestContext,
    res: &mut Response,
    book_uri: &str,
    uid: &str,
    with_body: bool,
) {
    match ctx.state.directory.get_contact(book_uri, uid).await {
        Ok(Some(contact)) => {
            set_content_type(res, VCARD_CONTENT_TYPE);
            set_etag(res, &contact.etag);
            res.status_code(StatusCode::OK);
            if with_body {
                res.body(contact.data);
            }
        }
        Ok(None) => {
            res.status_code(StatusCode::NOT_FOUND);
        }
        Err(err) => write_error(res, &err),
    }
}

/// Concatenates every object of a calendar into one export VCALENDAR.
async fn serve_calendar_export(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    with_body: bool,
) {
    let Some((calendar, _)) = read_calendar_or_error(ctx, collection, res).await else {
        return;
    };
    let objects = match ctx.state.store.list_calendar_objects(calendar.id).await {
        Ok(objects) => objects,
        Err(err) => {
            write_error(res, &err.into());
            return;
        }
    };

    let mut export = Component::named("VCALENDAR");
    export.push_property(Property::new("VERSION", "2.0"));
    export.push_property(Property::new("PRODID", "-//kunai//export//EN"));
    for object in &objects {
        if let Ok(root) = Component::parse(&object.data) {
            export.children.extend(root.children.into_iter());
        }
    }

    set_content_type(res, CALENDAR_CONTENT_TYPE);
    res.status_code(StatusCode::OK);
    if with_body {
        res.body(export.serialize());
    }
}

async fn serve_inbox_object(
    ctx: &RequestContext,
    res: &mut Response,
    owner: &str,
    uid: &str,
    with_body: bool,
) {
    if owner != ctx.principal.uid {
        res.status_code(StatusCode::FORBIDDEN);
        return;
    }
    match ctx.state.store.get_scheduling_object(owner, uid).await {
        Ok(Some(object)) => {
            set_content_type(res, CALENDAR_CONTENT_TYPE);
            res.status_code(StatusCode::OK);
            if with_body {
                res.body(object.data);
            }
        }
        Ok(None) => {
            res.status_code(StatusCode::NOT_FOUND);
        }
        Err(err) => write_error(res, &err.into()),
    }
}
