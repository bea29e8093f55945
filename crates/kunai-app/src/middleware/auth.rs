//! Authentication middleware.
//!
//! Credentials are verified by the directory: `Basic` through a simple
//! bind, `Bearer` through token introspection. The resolved principal is
//! injected into the depot for downstream handlers. OPTIONS passes
//! unauthenticated so discovery works before login.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use salvo::Depot;
use salvo::http::StatusCode;

use crate::state::state_from_depot;
use kunai_service::directory::{Directory, DirectoryUser};

/// Middleware handler for authentication. Place above every DAV route.
pub struct AuthMiddleware;

fn unauthorized(res: &mut salvo::Response) {
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header(
        "WWW-Authenticate",
        salvo::http::HeaderValue::from_static("Basic realm=\"kunai\""),
        true,
    );
    res.status_code(StatusCode::UNAUTHORIZED);
}

/// Splits a Basic credential into username and password.
fn decode_basic(credential: &str) -> Option<(String, String)> {
    let decoded = BASE64.decode(credential.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[salvo::async_trait]
impl salvo::Handler for AuthMiddleware {
    #[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    async fn handle(
        &self,
        req: &mut salvo::Request,
        depot: &mut Depot,
        res: &mut salvo::Response,
        ctrl: &mut salvo::FlowCtrl,
    ) {
        if req.method() == salvo::http::Method::OPTIONS {
            return;
        }

        let Some(state) = state_from_depot(depot).cloned() else {
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            ctrl.skip_rest();
            return;
        };

        let header = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let user: Option<DirectoryUser> = match header.as_deref() {
            Some(value) if value.len() > 6 && value[..6].eq_ignore_ascii_case("basic ") => {
                match decode_basic(&value[6..]) {
                    Some((username, password)) => {
                        match state.directory.bind_user(&username, &password).await {
                            Ok(user) => user,
                            Err(e) => {
                                tracing::error!(error = %e, "directory bind failed");
                                res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                                ctrl.skip_rest();
                                return;
                            }
                        }
                    }
                    None => None,
                }
            }
            Some(value) if value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ") => {
                match state.directory.introspect_token(value[7..].trim()).await {
                    Ok(user) => user,
                    Err(e) => {
                        tracing::error!(error = %e, "token introspection failed");
                        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                        ctrl.skip_rest();
                        return;
                    }
                }
            }
            _ => None,
        };

        match user {
            Some(user) => {
                tracing::debug!(uid = %user.uid, "authenticated");
                depot.inject(user);
            }
            None => {
                unauthorized(res);
                ctrl.skip_rest();
            }
        }
    }
}
