//! DELETE method handler for objects and collections.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use kunai_core::path::{CollectionRef, DavPath, ResourceKind, SchedulingBox};
use kunai_service::error::ServiceError;

use kunai_store::Store;
use super::{RequestContext, preconditions, request_context, write_error};

/// ## Summary
/// Deletes an object (honoring `If-Match`) or a whole collection.
/// Collection deletion is restricted to the owner; directory-backed
/// address books never accept deletes. Inbox objects may be removed by
/// their owner.
#[handler]
#[tracing::instrument(skip_all, fields(method = "DELETE", path = %req.uri().path()))]
pub async fn delete(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };

    match ctx.path.clone() {
        DavPath::Object { collection, uid } => {
            delete_object(&ctx, req, res, &collection, &uid).await;
        }
        DavPath::Collection(collection) => delete_collection(&ctx, res, &collection).await,
        DavPath::SchedulingObject {
            owner,
            bin: SchedulingBox::Inbox,
            uid,
        } => delete_inbox_object(&ctx, res, &owner, &uid).await,
        _ => {
            res.status_code(StatusCode::METHOD_NOT_ALLOWED);
        }
    }
}

async fn delete_object(
    ctx: &RequestContext,
    req: &Request,
    res: &mut Response,
    collection: &CollectionRef,
    uid: &str,
) {
    match collection.kind {
        ResourceKind::Calendar => {
            let calendar = match kunai_service::caldav::resolve_calendar(
                ctx.state.store.as_ref(),
                collection,
            )
            .await
            {
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
            match kunai_service::caldav::object::delete_object(
                ctx.state.store.as_ref(),
                &calendar,
                uid,
                preconditions(req),
                access,
            )
            .await
            {
                Ok(()) => {
                    res.status_code(StatusCode::NO_CONTENT);
                }
                Err(err) => write_error(res, &err),
            }
        }
        ResourceKind::Addressbook => {
            if collection
                .uri
                .starts_with(kunai_core::constants::DIRECTORY_BOOK_PREFIX)
            {
                write_error(
                    res,
                    &ServiceError::Forbidden(
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
            match kunai_service::carddav::object::delete_contact(
                ctx.state.store.as_ref(),
                &addressbook,
                uid,
                preconditions(req),
                access,
            )
            .await
            {
                Ok(()) => {
                    res.status_code(StatusCode::NO_CONTENT);
                }
                Err(err) => write_error(res, &err),
            }
        }
    }
}

async fn delete_collection(ctx: &RequestContext, res: &mut Response, collection: &CollectionRef) {
    match collection.kind {
        ResourceKind::Calendar => {
            match kunai_service::caldav::resolve_calendar(ctx.state.store.as_ref(), collection)
                .await
            {
                Ok(Some(calendar)) => {
                    if calendar.owner_uid != ctx.principal.uid {
                        write_error(
                            res,
                            &ServiceError::Forbidden(
                                "only the owner may delete a collection".to_string(),
                            ),
                        );
                        return;
                    }
                    match ctx.state.store.delete_calendar(calendar.id).await {
                        Ok(()) => {
                            res.status_code(StatusCode::NO_CONTENT);
                        }
                        Err(err) => write_error(res, &err.into()),
                    }
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err),
            }
        }
        ResourceKind::Addressbook => {
            match kunai_service::carddav::resolve_addressbook(ctx.state.store.as_ref(), collection)
                .await
            {
                Ok(Some(addressbook)) => {
                    if addressbook.is_directory_backed() {
                        write_error(
                            res,
                            &ServiceError::Forbidden(
                                "directory-backed address books are read-only".to_string(),
                            ),
                        );
                        return;
                    }
                    if addressbook.owner_uid != ctx.principal.uid {
                        write_error(
                            res,
                            &ServiceError::Forbidden(
                                "only the owner may delete a collection".to_string(),
                            ),
                        );
                        return;
                    }
                    match ctx.state.store.delete_addressbook(addressbook.id).await {
                        Ok(()) => {
                            res.status_code(StatusCode::NO_CONTENT);
                        }
                        Err(err) => write_error(res, &err.into()),
                    }
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err),
            }
        }
    }
}

async fn delete_inbox_object(ctx: &RequestContext, res: &mut Response, owner: &str, uid: &str) {
    if owner != ctx.principal.uid {
        write_error(
            res,
            &ServiceError::Forbidden("inbox belongs to another user".to_string()),
        );
        return;
    }
    match ctx.state.store.delete_scheduling_object(owner, uid).await {
        Ok(()) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => write_error(res, &err.into()),
    }
}
