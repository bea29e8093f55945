//! PROPPATCH handler: `DAV:displayname` set/remove on collections is
//! honored, everything else is silently ignored with a 200 propstat.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use kunai_core::path::{DavPath, ResourceKind};
use kunai_rfc::dav::multistatus::{Multistatus, Propstat, PropstatResponse};
use kunai_rfc::dav::parse::proppatch::parse_proppatch;
use kunai_rfc::dav::property::DavProperty;
use kunai_service::error::ServiceError;

use kunai_store::Store;
use super::{request_context, write_error, write_multistatus};

#[handler]
#[tracing::instrument(skip_all, fields(method = "PROPPATCH", path = %req.uri().path()))]
pub async fn proppatch(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Some(ctx) = request_context(req, depot, res) else {
        return;
    };
    let DavPath::Collection(collection) = ctx.path.clone() else {
        write_error(
            res,
            &ServiceError::Forbidden("properties are writable on collections only".to_string()),
        );
        return;
    };

    let Some(body) = super::read_body(req, res).await else {
        return;
    };
    let update = match parse_proppatch(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::debug!(error = %e, "malformed PROPPATCH body");
            res.status_code(StatusCode::BAD_REQUEST);
            return;
        }
    };

    enum NameChange {
        Set(String),
        Remove,
    }

    let mut change: Option<NameChange> = None;
    let mut acked: Vec<DavProperty> = Vec::new();
    for (name, value) in &update.set {
        if name.is_dav() && name.local_name() == "displayname" {
            change = Some(NameChange::Set(value.clone()));
        }
        acked.push(DavProperty::empty(name.clone()));
    }
    for name in &update.remove {
        if name.is_dav() && name.local_name() == "displayname" {
            change = Some(NameChange::Remove);
        }
        acked.push(DavProperty::empty(name.clone()));
    }

    if let Some(change) = change {
        let new_name = match change {
            NameChange::Set(value) => Some(value),
            NameChange::Remove => None,
        };
        let applied = match collection.kind {
            ResourceKind::Calendar => {
                match kunai_service::caldav::resolve_calendar(ctx.state.store.as_ref(), &collection)
                    .await
                {
                    Ok(Some(calendar)) => {
                        if calendar.owner_uid == ctx.principal.uid {
                            ctx.state
                                .store
                                .update_calendar_displayname(calendar.id, new_name)
                                .await
                                .map_err(Into::into)
                        } else {
                            // Renaming someone else's collection needs
                            // the write-properties privilege.
                            match ctx
                                .state
                                .acl
                                .effective(&ctx.principal, &calendar.uri)
                                .await
                            {
                                Ok(effective) if effective.write_props => ctx
                                    .state
                                    .store
                                    .update_calendar_displayname(calendar.id, new_name)
                                    .await
                                    .map_err(Into::into),
                                Ok(_) => Err(ServiceError::Forbidden(
                                    "write-properties denied".to_string(),
                                )),
                                Err(err) => Err(err),
                            }
                        }
                    }
                    Ok(None) => Err(ServiceError::NotFound(collection.uri.clone())),
                    Err(err) => Err(err),
                }
            }
            ResourceKind::Addressbook
                if collection
                    .uri
                    .starts_with(kunai_core::constants::DIRECTORY_BOOK_PREFIX) =>
            {
                Err(ServiceError::Forbidden(
                    "directory-backed address books are read-only".to_string(),
                ))
            }
            ResourceKind::Addressbook => {
                match kunai_service::carddav::resolve_addressbook(
                    ctx.state.store.as_ref(),
                    &collection,
                )
                .await
                {
                    Ok(Some(addressbook)) => {
                        if addressbook.is_directory_backed() {
                            Err(ServiceError::Forbidden(
                                "directory-backed address books are read-only".to_string(),
                            ))
                        } else if addressbook.owner_uid == ctx.principal.uid {
                            ctx.state
                                .store
                                .update_addressbook_displayname(addressbook.id, new_name)
                                .await
                                .map_err(Into::into)
                        } else {
                            Err(ServiceError::Forbidden("write-properties denied".to_string()))
                        }
                    }
                    Ok(None) => Err(ServiceError::NotFound(collection.uri.clone())),
                    Err(err) => Err(err),
                }
            }
        };

        if let Err(err) = applied {
            write_error(res, &err);
            return;
        }
    }

    let href = kunai_core::path::href::collection(ctx.base_prefix(), &collection);
    let multistatus =
        Multistatus::new(vec![PropstatResponse::with_propstat(href, Propstat::ok(acked))]);
    write_multistatus(res, &multistatus);
}
