//! MKCOL / MKCALENDAR handlers. Both converge on the same collection
//! creation path; the MKCALENDAR XML body is a convenience for an
//! initial displayname.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use kunai_core::path::{CollectionRef, DavPath, ResourceKind};
use kunai_rfc::dav::parse::proppatch::parse_proppatch;
use kunai_service::error::ServiceError;
use kunai_store::memory::{new_addressbook, new_calendar};

use kunai_store::Store;
use super::{RequestContext, read_body, request_context, write_error};

#[handler]
#[tracing::instrument(skip_all, fields(method = "MKCOL", path = %req.uri().path()))]
pub async fn mkcol(req: &mut Request, res: &mut Response, depot: &Depot) {
    make_collection(req, res, depot).await;
}

#[handler]
#[tracing::instrument(skip_all, fields(method = "MKCALENDAR", path = %req.uri().path()))]
pub async fn mkcalendar(req: &mut Request, res: &mut Response, depot: &Depot) {
    make_collection(req, res, depot).await;
}

async fn make_collection(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let DavPath::Collection(collection) = ctx.path.clone() else {
        res.status_code(StatusCode::METHOD_NOT_ALLOWED);
        return;
    };

    // Collections are created under the requester's own home.
    if collection.shared || collection.owner != ctx.principal.uid {
        write_error(
            res,
            &ServiceError::Forbidden("collections are created under the owner's home".to_string()),
        );
        return;
    }

    // The body, when present, may carry an initial displayname inside
    // D:set/D:prop (MKCALENDAR and extended MKCOL share that shape).
    let Some(body) = read_body(req, res).await else {
        return;
    };
    let display_name = if body.is_empty() {
        None
    } else {
        match parse_proppatch(&body) {
            Ok(update) => update
                .set
                .into_iter()
                .find(|(name, _)| name.is_dav() && name.local_name() == "displayname")
                .map(|(_, value)| value),
            Err(e) => {
                tracing::debug!(error = %e, "unparseable MKCOL body ignored");
                None
            }
        }
    };

    create(&ctx, res, &collection, display_name).await;
}

async fn create(
    ctx: &RequestContext,
    res: &mut Response,
    collection: &CollectionRef,
    display_name: Option<String>,
) {
    let result = match collection.kind {
        ResourceKind::Calendar => ctx
            .state
            .store
            .create_calendar(new_calendar(
                &ctx.principal.uid,
                &collection.uri,
                display_name,
            ))
            .await
            .map(|_| ()),
        ResourceKind::Addressbook => {
            if collection.uri.starts_with(kunai_core::constants::DIRECTORY_BOOK_PREFIX) {
                write_error(
                    res,
                    &ServiceError::Forbidden(
                        "the ldap_ prefix is reserved for directory-backed books".to_string(),
                    ),
                );
                return;
            }
            ctx.state
                .store
                .create_addressbook(new_addressbook(
                    &ctx.principal.uid,
                    &collection.uri,
                    display_name,
                ))
                .await
                .map(|_| ())
        }
    };

    match result {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
        }
        Err(err) => write_error(res, &err.into()),
    }
}
