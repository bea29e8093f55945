//! ACL method handler: ACL management endpoints are not exposed; group
//! bindings in the directory are the single source of authority.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn acl(req: &mut Request, res: &mut Response, _depot: &Depot) {
    res.status_code(StatusCode::FORBIDDEN);
    res.body("ACLs managed via LDAP groups".to_string());
}
