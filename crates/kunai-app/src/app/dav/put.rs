//! PUT method handler for calendar objects and contacts.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use kunai_core::path::{DavPath, ResourceKind};

use super::{RequestContext, read_body, request_context, set_etag, write_error};

/// ## Summary
/// Routes a PUT to the calendar or contact write pipeline. Non-object
/// targets answer 405.
///
/// ## Errors
/// Maps the full §7 taxonomy through [`write_error`].
#[handler]
#[tracing::instrument(skip_all, fields(method = "PUT", path = %req.uri().path()))]
pub async fn put(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let DavPath::Object { collection, uid } = ctx.path.clone() else {
        res.status_code(StatusCode::METHOD_NOT_ALLOWED);
        return;
    };
    let Some(body) = read_body(req, res).await else {
        return;
    };

    match collection.kind {
        ResourceKind::Calendar => put_calendar(&ctx, req, res, &collection, &uid, &body).await,
        ResourceKind::Addressbook => {
            put_contact(&ctx, req, res, &collection, &uid, &body).await;
        }
    }
}

async fn put_calendar(
    ctx: &RequestContext,
    req: &Request,
    res: &mut Response,
    collection: &kunai_core::path::CollectionRef,
    uid: &str,
    body: &[u8],
) {
    let calendar =
        match kunai_service::caldav::resolve_calendar(ctx.state.store.as_ref(), collection).await {
            Ok(Some(calendar)) => calendar,
            Ok(None) => {
                res.status_code(StatusCode::NOT_FOUND);
                return;
            }
            Err(err) => {
                write_error(res, &err);
                return;
            }
        };

    let access = match ctx
        .collection_access(&calendar.owner_uid, &calendar.uri)
        .await
    {
        Ok(access) => access,
        Err(err) => {
            write_error(res, &err);
            return;
        }
    };

    match kunai_service::caldav::object::put_object(
        ctx.state.store.as_ref(),
        &calendar,
        uid,
        body,
        super::preconditions(req),
        access,
        ctx.state.settings.dav.max_resource_size,
        ctx.state.settings.dav.server_tz(),
    )
    .await
    {
        Ok(outcome) => {
            set_etag(res, &outcome.object.etag);
            res.status_code(if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::NO_CONTENT
            });
        }
        Err(err) => write_error(res, &err),
    }
}

async fn put_contact(
    ctx: &RequestContext,
    req: &Request,
    res: &mut Response,
    collection: &kunai_core::path::CollectionRef,
    uid: &str,
    body: &[u8],
) {
    if collection
        .uri
        .starts_with(kunai_core::constants::DIRECTORY_BOOK_PREFIX)
    {
        write_error(
            res,
            &kunai_service::error::ServiceError::Forbidden(
                "directory-backed address books are read-only".to_string(),
            ),
        );
        return;
    }
    let addressbook = match kunai_service::carddav::resolve_addressbook(
        ctx.state.store.as_ref(),
        collection,
    )
    .await
    {
        Ok(Some(addressbook)) => addressbook,
        Ok(None) => {
            res.status_code(StatusCode::NOT_FOUND);
            return;
        }
        Err(err) => {
            write_error(res, &err);
            return;
        }
    };

    let access = match ctx
        .collection_access(&addressbook.owner_uid, &addressbook.uri)
        .await
    {
        Ok(access) => access,
        Err(err) => {
            write_error(res, &err);
            return;
        }
    };

    match kunai_service::carddav::object::put_contact(
        ctx.state.store.as_ref(),
        &addressbook,
        uid,
        body,
        super::preconditions(req),
        access,
        ctx.state.settings.dav.max_resource_size,
    )
    .await
    {
        Ok(outcome) => {
            set_etag(res, &outcome.contact.etag);
            res.status_code(if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::NO_CONTENT
            });
        }
        Err(err) => write_error(res, &err),
    }
}
