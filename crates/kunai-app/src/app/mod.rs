//! Route assembly.

pub mod dav;
pub mod well_known;

use salvo::Router;

use crate::middleware::auth::AuthMiddleware;
use crate::state::{AppState, StateInjector};

/// ## Summary
/// Constructs the full router: well-known redirects plus the DAV tree
/// under the configured base prefix. Extension methods (PROPFIND,
/// PROPPATCH, REPORT, MKCOL, MKCALENDAR, ACL) are routed with method
/// filters since they have no dedicated helpers.
#[must_use]
pub fn routes(state: AppState) -> Router {
    let prefix = state
        .base_prefix()
        .trim_matches('/')
        .to_string();

    Router::new()
        .hoop(StateInjector { state })
        .push(Router::with_path(".well-known/caldav").goal(well_known::caldav))
        .push(Router::with_path(".well-known/carddav").goal(well_known::carddav))
        .push(
            Router::with_path(format!("{prefix}/{{**rest}}"))
                .hoop(AuthMiddleware)
                .options(dav::options::options)
                .get(dav::get_head::get)
                .head(dav::get_head::head)
                .put(dav::put::put)
                .delete(dav::delete::delete)
                .post(dav::post::post)
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "PROPFIND")
                        .goal(dav::propfind::propfind),
                )
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "PROPPATCH")
                        .goal(dav::proppatch::proppatch),
                )
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "REPORT")
                        .goal(dav::report::report),
                )
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "MKCOL")
                        .goal(dav::mkcol::mkcol),
                )
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "MKCALENDAR")
                        .goal(dav::mkcol::mkcalendar),
                )
                .push(
                    Router::new()
                        .filter_fn(|req, _| req.method().as_str() == "ACL")
                        .goal(dav::method_acl::acl),
                ),
        )
}
