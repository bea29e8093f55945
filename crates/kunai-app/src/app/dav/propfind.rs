//! PROPFIND method handler.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use kunai_core::constants::DIRECTORY_BOOK_PREFIX;
use kunai_core::path::{self, CollectionRef, DavPath, ResourceKind, SchedulingBox};
use kunai_rfc::dav::multistatus::{Multistatus, PropstatResponse};
use kunai_rfc::dav::parse::propfind::{PropfindRequest, parse_propfind};
use kunai_store::memory::new_addressbook;

use kunai_service::directory::Directory;
use kunai_store::Store;

use super::props::{AclView, PropEmitter};
use super::{
    RequestContext, non_owner_effective, read_addressbook_or_error, read_body,
    read_calendar_or_error, request_context, write_error, write_multistatus,
};

/// Requested traversal depth; `infinity` is clamped to one level.
fn parse_depth(req: &Request) -> u8 {
    match req
        .headers()
        .get("Depth")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some("1" | "infinity" | "Infinity") => 1,
        _ => 0,
    }
}

/// ## Summary
/// Handles PROPFIND across the whole URL space: root, principals, homes
/// (with owned, scheduling, shared-mounted, and directory-backed
/// children at depth 1), collections (with object children at depth 1),
/// and objects.
#[handler]
#[tracing::instrument(skip_all, fields(method = "PROPFIND", path = %req.uri().path()))]
pub async fn propfind(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let depth = parse_depth(req);

    let Some(body) = read_body(req, res).await else {
        return;
    };
    let request = match parse_propfind(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "malformed PROPFIND body");
            res.status_code(StatusCode::BAD_REQUEST);
            return;
        }
    };

    let emitter = PropEmitter {
        prefix: ctx.base_prefix(),
        principal: &ctx.principal,
        dav: &ctx.state.settings.dav,
    };

    match ctx.path.clone() {
        DavPath::Root => {
            let props = emitter.home_collection(&request, ResourceKind::Calendar, &ctx.principal.uid);
            let href = format!("{}/", ctx.base_prefix());
            write_multistatus(
                res,
                &Multistatus::new(vec![PropstatResponse::from_properties(href, props)]),
            );
        }
        DavPath::Principal { uid } => {
            let props = emitter.principal_resource(&request, &uid);
            let href = path::href::principal(ctx.base_prefix(), &uid);
            write_multistatus(
                res,
                &Multistatus::new(vec![PropstatResponse::from_properties(href, props)]),
            );
        }
        DavPath::Home { kind, owner } => {
            home_propfind(&ctx, res, &emitter, &request, kind, &owner, depth).await;
        }
        DavPath::Collection(collection) => {
            collection_propfind(&ctx, res, &emitter, &request, &collection, depth).await;
        }
        DavPath::Scheduling { owner, bin } => {
            scheduling_propfind(&ctx, res, &emitter, &request, &owner, bin, depth).await;
        }
        DavPath::Object { collection, uid } => {
            object_propfind(&ctx, res, &emitter, &request, &collection, &uid).await;
        }
        DavPath::SchedulingObject { .. } => {
            res.status_code(StatusCode::NOT_FOUND);
        }
    }
}

#[expect(clippy::too_many_arguments, reason = "handler plumbing")]
async fn home_propfind(
    ctx: &RequestContext,
    res: &mut Response,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    kind: ResourceKind,
    owner: &str,
    depth: u8,
) {
    let home_href = path::href::home(ctx.base_prefix(), kind, owner);
    let mut responses = vec![PropstatResponse::from_properties(
        home_href,
        emitter.home_collection(request, kind, owner),
    )];

    // Children are listed only on the requester's own home; foreign
    // collections surface through the shared mount instead.
    if depth == 1 && owner == ctx.principal.uid {
        match kind {
            ResourceKind::Calendar => {
                if let Err(err) =
                    calendar_home_children(ctx, emitter, request, owner, &mut responses).await
                {
                    write_error(res, &err);
                    return;
                }
            }
            ResourceKind::Addressbook => {
                if let Err(err) =
                    addressbook_home_children(ctx, emitter, request, owner, &mut responses).await
                {
                    write_error(res, &err);
                    return;
                }
            }
        }
    }

    write_multistatus(res, &Multistatus::new(responses));
}

async fn calendar_home_children(
    ctx: &RequestContext,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    owner: &str,
    responses: &mut Vec<PropstatResponse>,
) -> Result<(), kunai_service::error::ServiceError> {
    for calendar in ctx.state.store.list_calendars(owner).await? {
        let collection = CollectionRef {
            kind: ResourceKind::Calendar,
            owner: owner.to_string(),
            uri: calendar.uri.clone(),
            shared: false,
        };
        let href = path::href::collection(ctx.base_prefix(), &collection);
        let acl_view = AclView {
            owner_uid: owner,
            non_owner_effective: None,
        };
        responses.push(PropstatResponse::from_properties(
            href,
            emitter.calendar_collection(request, &calendar, &acl_view),
        ));
    }

    for bin in [SchedulingBox::Inbox, SchedulingBox::Outbox] {
        let href = path::href::scheduling(ctx.base_prefix(), owner, bin);
        responses.push(PropstatResponse::from_properties(
            href,
            emitter.scheduling_collection(request, owner, bin),
        ));
    }

    // Shared mount: every collection the directory grants this user.
    let visible = ctx.state.acl.visible_collections(&ctx.principal).await?;
    for (uri, effective) in visible {
        if !effective.read {
            continue;
        }
        let Some(calendar) = ctx.state.store.find_calendar_by_uri(&uri).await? else {
            continue;
        };
        if calendar.owner_uid == ctx.principal.uid {
            continue;
        }
        let collection = CollectionRef {
            kind: ResourceKind::Calendar,
            owner: owner.to_string(),
            uri: calendar.uri.clone(),
            shared: true,
        };
        let href = path::href::collection(ctx.base_prefix(), &collection);
        let acl_view = AclView {
            owner_uid: &calendar.owner_uid,
            non_owner_effective: Some(effective),
        };
        responses.push(PropstatResponse::from_properties(
            href,
            emitter.calendar_collection(request, &calendar, &acl_view),
        ));
    }

    Ok(())
}

async fn addressbook_home_children(
    ctx: &RequestContext,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    owner: &str,
    responses: &mut Vec<PropstatResponse>,
) -> Result<(), kunai_service::error::ServiceError> {
    for addressbook in ctx.state.store.list_addressbooks(owner).await? {
        let collection = CollectionRef {
            kind: ResourceKind::Addressbook,
            owner: owner.to_string(),
            uri: addressbook.uri.clone(),
            shared: false,
        };
        let href = path::href::collection(ctx.base_prefix(), &collection);
        let acl_view = AclView {
            owner_uid: owner,
            non_owner_effective: None,
        };
        responses.push(PropstatResponse::from_properties(
            href,
            emitter.addressbook_collection(request, &addressbook, &acl_view),
        ));
    }

    // Directory-backed read-only books appear in every home.
    for book in ctx.state.directory.list_addressbooks().await? {
        let pseudo = new_addressbook(owner, &book.uri, Some(book.display_name.clone()));
        let collection = CollectionRef {
            kind: ResourceKind::Addressbook,
            owner: owner.to_string(),
            uri: book.uri.clone(),
            shared: false,
        };
        let href = path::href::collection(ctx.base_prefix(), &collection);
        let acl_view = AclView {
            owner_uid: owner,
            non_owner_effective: None,
        };
        responses.push(PropstatResponse::from_properties(
            href,
            emitter.addressbook_collection(request, &pseudo, &acl_view),
        ));
    }

    Ok(())
}

async fn collection_propfind(
    ctx: &RequestContext,
    res: &mut Response,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    collection: &CollectionRef,
    depth: u8,
) {
    match collection.kind {
        ResourceKind::Calendar => {
            let Some((calendar, access)) = read_calendar_or_error(ctx, collection, res).await
            else {
                return;
            };
            let acl_view = AclView {
                owner_uid: &calendar.owner_uid,
                non_owner_effective: non_owner_effective(access),
            };
            let href = path::href::collection(ctx.base_prefix(), collection);
            let mut responses = vec![PropstatResponse::from_properties(
                href,
                emitter.calendar_collection(request, &calendar, &acl_view),
            )];

            if depth == 1 {
                match ctx.state.store.list_calendar_objects(calendar.id).await {
                    Ok(objects) => {
                        for object in objects {
                            let href =
                                path::href::object(ctx.base_prefix(), collection, &object.uid);
                            responses.push(PropstatResponse::from_properties(
                                href,
                                emitter.object_entry(
                                    request,
                                    ResourceKind::Calendar,
                                    &object.etag,
                                    Some(&object.data),
                                    object.updated_at,
                                ),
                            ));
                        }
                    }
                    Err(err) => {
                        write_error(res, &err.into());
                        return;
                    }
                }
            }
            write_multistatus(res, &Multistatus::new(responses));
        }
        ResourceKind::Addressbook if collection.uri.starts_with(DIRECTORY_BOOK_PREFIX) => {
            directory_book_propfind(ctx, res, emitter, request, collection, depth).await;
        }
        ResourceKind::Addressbook => {
            let Some((addressbook, access)) = read_addressbook_or_error(ctx, collection, res).await
            else {
                return;
            };
            let acl_view = AclView {
                owner_uid: &addressbook.owner_uid,
                non_owner_effective: non_owner_effective(access),
            };
            let href = path::href::collection(ctx.base_prefix(), collection);
            let mut responses = vec![PropstatResponse::from_properties(
                href,
                emitter.addressbook_collection(request, &addressbook, &acl_view),
            )];

            if depth == 1 {
                match ctx.state.store.list_contacts(addressbook.id).await {
                    Ok(contacts) => {
                        for contact in contacts {
                            let href =
                                path::href::object(ctx.base_prefix(), collection, &contact.uid);
                            responses.push(PropstatResponse::from_properties(
                                href,
                                emitter.object_entry(
                                    request,
                                    ResourceKind::Addressbook,
                                    &contact.etag,
                                    Some(&contact.data),
                                    contact.updated_at,
                                ),
                            ));
                        }
                    }
                    Err(err) => {
                        write_error(res, &err.into());
                        return;
                    }
                }
            }
            write_multistatus(res, &Multistatus::new(responses));
        }
    }
}

async fn directory_book_propfind(
    ctx: &RequestContext,
    res: &mut Response,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    collection: &CollectionRef,
    depth: u8,
) {
    let books = match ctx.state.directory.list_addressbooks().await {
        Ok(books) => books,
        Err(err) => {
            write_error(res, &err);
            return;
        }
    };
    let Some(book) = books.into_iter().find(|b| b.uri == collection.uri) else {
        res.status_code(StatusCode::NOT_FOUND);
        return;
    };

    let pseudo = new_addressbook(
        &collection.owner,
        &book.uri,
        Some(book.display_name.clone()),
    );
    let acl_view = AclView {
        owner_uid: &collection.owner,
        non_owner_effective: None,
    };
    let href = path::href::collection(ctx.base_prefix(), collection);
    let mut responses = vec![PropstatResponse::from_properties(
        href,
        emitter.addressbook_collection(request, &pseudo, &acl_view),
    )];

    if depth == 1 {
        match ctx.state.directory.list_contacts(&collection.uri).await {
            Ok(contacts) => {
                for contact in contacts {
                    let href = path::href::object(ctx.base_prefix(), collection, &contact.uid);
                    responses.push(PropstatResponse::from_properties(
                        href,
                        emitter.object_entry(
                            request,
                            ResourceKind::Addressbook,
                            &contact.etag,
                            Some(&contact.data),
                            chrono::Utc::now(),
                        ),
                    ));
                }
            }
            Err(err) => {
                write_error(res, &err);
                return;
            }
        }
    }
    write_multistatus(res, &Multistatus::new(responses));
}

#[expect(clippy::too_many_arguments, reason = "handler plumbing")]
async fn scheduling_propfind(
    ctx: &RequestContext,
    res: &mut Response,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    owner: &str,
    bin: SchedulingBox,
    depth: u8,
) {
    if owner != ctx.principal.uid {
        res.status_code(StatusCode::FORBIDDEN);
        return;
    }
    if let Err(err) = ctx.state.store.ensure_scheduling_collections(owner).await {
        write_error(res, &err.into());
        return;
    }

    let href = path::href::scheduling(ctx.base_prefix(), owner, bin);
    let mut responses = vec![PropstatResponse::from_properties(
        href.clone(),
        emitter.scheduling_collection(request, owner, bin),
    )];

    if depth == 1 && bin == SchedulingBox::Inbox {
        match ctx.state.store.list_scheduling_objects(owner).await {
            Ok(objects) => {
                for object in objects {
                    let object_href = format!("{href}{}.ics", object.uid);
                    responses.push(PropstatResponse::from_properties(
                        object_href,
                        emitter.object_entry(
                            request,
                            ResourceKind::Calendar,
                            &kunai_store::etag::generate_etag(object.data.as_bytes()),
                            Some(&object.data),
                            object.received_at,
                        ),
                    ));
                }
            }
            Err(err) => {
                write_error(res, &err.into());
                return;
            }
        }
    }
    write_multistatus(res, &Multistatus::new(responses));
}

async fn object_propfind(
    ctx: &RequestContext,
    res: &mut Response,
    emitter: &PropEmitter<'_>,
    request: &PropfindRequest,
    collection: &CollectionRef,
    uid: &str,
) {
    match collection.kind {
        ResourceKind::Calendar => {
            let Some((calendar, _)) = read_calendar_or_error(ctx, collection, res).await else {
                return;
            };
            match ctx.state.store.get_calendar_object(calendar.id, uid).await {
                Ok(Some(object)) => {
                    let href = path::href::object(ctx.base_prefix(), collection, uid);
                    let props = emitter.object_entry(
                        request,
                        ResourceKind::Calendar,
                        &object.etag,
                        Some(&object.data),
                        object.updated_at,
                    );
                    write_multistatus(
                        res,
                        &Multistatus::new(vec![PropstatResponse::from_properties(href, props)]),
                    );
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err.into()),
            }
        }
        ResourceKind::Addressbook => {
            let Some((addressbook, _)) = read_addressbook_or_error(ctx, collection, res).await
            else {
                return;
            };
            match ctx.state.store.get_contact(addressbook.id, uid).await {
                Ok(Some(contact)) => {
                    let href = path::href::object(ctx.base_prefix(), collection, uid);
                    let props = emitter.object_entry(
                        request,
                        ResourceKind::Addressbook,
                        &contact.etag,
                        Some(&contact.data),
                        contact.updated_at,
                    );
                    write_multistatus(
                        res,
                        &Multistatus::new(vec![PropstatResponse::from_properties(href, props)]),
                    );
                }
                Ok(None) => {
                    res.status_code(StatusCode::NOT_FOUND);
                }
                Err(err) => write_error(res, &err.into()),
            }
        }
    }
}
