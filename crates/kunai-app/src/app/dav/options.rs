//! OPTIONS method handler.

use salvo::http::HeaderValue;
use salvo::{Depot, Request, Response, handler};

/// ## Summary
/// Advertises the supported methods and DAV compliance classes. Objects
/// drop the collection-creation methods.
///
/// ## Side Effects
/// Sets the `Allow` and `DAV` headers on the response.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn options(req: &mut Request, res: &mut Response, _depot: &Depot) {
    let is_object = req.uri().path().ends_with(".ics") || req.uri().path().ends_with(".vcf");

    let allow_methods = if is_object {
        "OPTIONS, HEAD, GET, PUT, DELETE, PROPFIND, REPORT"
    } else {
        "OPTIONS, HEAD, GET, PUT, DELETE, PROPFIND, PROPPATCH, REPORT, MKCOL, MKCALENDAR, POST, ACL"
    };

    // Class 1 WebDAV, access control, CalDAV, scheduling, CardDAV.
    let dav_header = "1, 3, calendar-access, calendar-schedule, addressbook";

    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header("Allow", HeaderValue::from_static(allow_methods), true);
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header("DAV", HeaderValue::from_static(dav_header), true);
    res.status_code(salvo::http::StatusCode::OK);
}
