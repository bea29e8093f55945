//! Shared WebDAV handler mechanics: path resolution, access checks, body
//! extraction, and Multi-Status emission. Method handlers live in the
//! sibling modules.

pub mod delete;
pub mod get_head;
pub mod method_acl;
pub mod mkcol;
pub mod options;
pub mod post;
pub mod propfind;
pub mod proppatch;
pub mod props;
pub mod put;
pub mod report;

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response};

use kunai_core::error::CoreError;
use kunai_core::path::{self, CollectionRef, DavPath};
use kunai_rfc::dav::build::serialize_multistatus;
use kunai_rfc::dav::multistatus::Multistatus;
use kunai_service::auth::Effective;
use kunai_service::caldav::object::WriteAccess;
use kunai_service::directory::DirectoryUser;
use kunai_service::error::{ServiceError, ServiceResult};

use crate::error::write_service_error;
use crate::state::{AppState, principal_from_depot, state_from_depot};

/// Per-request context assembled from depot state and the routed path.
pub struct RequestContext {
    pub state: AppState,
    pub principal: DirectoryUser,
    pub path: DavPath,
}

/// ## Summary
/// Builds the request context: state, authenticated principal, and the
/// routed [`DavPath`]. Writes the error response and returns `None` when
/// any piece is missing.
pub fn request_context(req: &Request, depot: &Depot, res: &mut Response) -> Option<RequestContext> {
    let Some(state) = state_from_depot(depot).cloned() else {
        tracing::error!("application state missing from depot");
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return None;
    };
    let Some(principal) = principal_from_depot(depot).cloned() else {
        res.status_code(StatusCode::UNAUTHORIZED);
        return None;
    };

    let raw_path = req.uri().path();
    let parsed = match path::parse(state.base_prefix(), raw_path) {
        Ok(parsed) => parsed,
        Err(CoreError::UnsafeSegment(segment)) => {
            tracing::debug!(path = raw_path, segment, "unsafe path segment");
            res.status_code(StatusCode::BAD_REQUEST);
            res.body("bad request".to_string());
            return None;
        }
        Err(_) => {
            res.status_code(StatusCode::NOT_FOUND);
            return None;
        }
    };

    Some(RequestContext {
        state,
        principal,
        path: parsed,
    })
}

impl RequestContext {
    /// The requester's access to a collection owned by `owner_uid` with
    /// the given URI: ownership short-circuits, everything else goes
    /// through the directory-backed resolver.
    pub async fn collection_access(
        &self,
        owner_uid: &str,
        uri: &str,
    ) -> ServiceResult<WriteAccess> {
        if owner_uid == self.principal.uid {
            return Ok(WriteAccess::Owner);
        }
        let effective = self.state.acl.effective(&self.principal, uri).await?;
        Ok(WriteAccess::Shared(effective))
    }

    /// Requires `Read` (or ownership) on a collection.
    pub async fn require_read(&self, owner_uid: &str, uri: &str) -> ServiceResult<WriteAccess> {
        let access = self.collection_access(owner_uid, uri).await?;
        match access {
            WriteAccess::Owner => Ok(access),
            WriteAccess::Shared(effective) if effective.read => Ok(access),
            WriteAccess::Shared(_) => Err(ServiceError::Forbidden(format!(
                "read access to {uri} denied"
            ))),
        }
    }

    #[must_use]
    pub fn base_prefix(&self) -> &str {
        self.state.base_prefix()
    }
}

/// The non-owner effective set for ACL emission, `None` for owners.
#[must_use]
pub fn non_owner_effective(access: WriteAccess) -> Option<Effective> {
    match access {
        WriteAccess::Owner => None,
        WriteAccess::Shared(effective) => Some(effective),
    }
}

/// Reads the request body, mapping transport failures to 400.
pub async fn read_body(req: &mut Request, res: &mut Response) -> Option<Vec<u8>> {
    match req.payload().await {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            res.status_code(StatusCode::BAD_REQUEST);
            None
        }
    }
}

/// Serializes and writes a 207 Multi-Status response.
pub fn write_multistatus(res: &mut Response, multistatus: &Multistatus) {
    let xml = match serialize_multistatus(multistatus) {
        Ok(xml) => xml,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize multistatus");
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    res.status_code(StatusCode::MULTI_STATUS);
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header(
        "Content-Type",
        salvo::http::HeaderValue::from_static("application/xml; charset=utf-8"),
        true,
    );
    res.body(xml);
}

/// Writes a service-layer error response.
pub fn write_error(res: &mut Response, err: &ServiceError) {
    write_service_error(res, err);
}

/// Sets the quoted `ETag` response header.
pub fn set_etag(res: &mut Response, etag: &str) {
    if let Ok(value) = salvo::http::HeaderValue::from_str(&format!("\"{etag}\"")) {
        #[expect(
            clippy::let_underscore_must_use,
            reason = "Header addition failure is non-fatal"
        )]
        let _ = res.add_header("ETag", value, true);
    }
}

/// Extracts `If-Match`/`If-None-Match` into service preconditions.
#[must_use]
pub fn preconditions(req: &Request) -> kunai_service::caldav::object::Preconditions<'_> {
    kunai_service::caldav::object::Preconditions {
        if_match: req.headers().get("If-Match").and_then(|v| v.to_str().ok()),
        if_none_match: req
            .headers()
            .get("If-None-Match")
            .and_then(|v| v.to_str().ok()),
    }
}

/// The calendar collection a routed path refers to, with read access
/// enforced; writes the error response itself on failure.
pub async fn read_calendar_or_error(
    ctx: &RequestContext,
    collection: &CollectionRef,
    res: &mut Response,
) -> Option<(kunai_store::model::Calendar, WriteAccess)> {
    match kunai_service::caldav::resolve_calendar(ctx.state.store.as_ref(), collection).await {
        Ok(Some(calendar)) => {
            match ctx.require_read(&calendar.owner_uid, &calendar.uri).await {
                Ok(access) => Some((calendar, access)),
                Err(err) => {
                    write_error(res, &err);
                    None
                }
            }
        }
        Ok(None) => {
            res.status_code(StatusCode::NOT_FOUND);
            None
        }
        Err(err) => {
            write_error(res, &err);
            None
        }
    }
}

/// Address-book analogue of [`read_calendar_or_error`].
pub async fn read_addressbook_or_error(
    ctx: &RequestContext,
    collection: &CollectionRef,
    res: &mut Response,
) -> Option<(kunai_store::model::Addressbook, WriteAccess)> {
    match kunai_service::carddav::resolve_addressbook(ctx.state.store.as_ref(), collection).await {
        Ok(Some(addressbook)) => {
            match ctx
                .require_read(&addressbook.owner_uid, &addressbook.uri)
                .await
            {
                Ok(access) => Some((addressbook, access)),
                Err(err) => {
                    write_error(res, &err);
                    None
                }
            }
        }
        Ok(None) => {
            res.status_code(StatusCode::NOT_FOUND);
            None
        }
        Err(err) => {
            write_error(res, &err);
            None
        }
    }
}
