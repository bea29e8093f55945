//! Service-error to HTTP mapping.

use salvo::Response;
use salvo::http::StatusCode;
use thiserror::Error;

use kunai_service::error::ServiceError;

/// Application-level errors (HTTP layer).
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Core(#[from] kunai_core::error::CoreError),

    #[error(transparent)]
    Rfc(#[from] kunai_rfc::error::RfcError),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Maps a service error onto a status code and a short plain-text body.
/// Internal details are logged, never leaked.
pub fn write_service_error(res: &mut Response, err: &ServiceError) {
    let (status, body): (StatusCode, &str) = match err {
        ServiceError::BadRequest(_) | ServiceError::Rfc(_) => {
            (StatusCode::BAD_REQUEST, "bad request")
        }
        ServiceError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload too large"),
        ServiceError::AuthRequired => (StatusCode::UNAUTHORIZED, "authentication required"),
        ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not found"),
        ServiceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        ServiceError::PreconditionFailed => {
            (StatusCode::PRECONDITION_FAILED, "precondition failed")
        }
        ServiceError::UnsupportedMediaType(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported media type")
        }
        ServiceError::Storage(_) | ServiceError::Directory(_) => {
            tracing::error!(error = %err, "internal failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    };

    if status.is_client_error() {
        tracing::debug!(error = %err, status = %status, "request rejected");
    }
    if status == StatusCode::UNAUTHORIZED {
        #[expect(
            clippy::let_underscore_must_use,
            reason = "Header addition failure is non-fatal"
        )]
        let _ = res.add_header(
            "WWW-Authenticate",
            salvo::http::HeaderValue::from_static("Basic realm=\"kunai\""),
            true,
        );
    }
    res.status_code(status);
    res.body(body.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_maps_to_412() {
        let mut res = Response::new();
        write_service_error(&mut res, &ServiceError::PreconditionFailed);
        assert_eq!(res.status_code, Some(StatusCode::PRECONDITION_FAILED));
    }

    #[test]
    fn storage_maps_to_500_with_generic_body() {
        let mut res = Response::new();
        write_service_error(&mut res, &ServiceError::Storage("pg down".to_string()));
        assert_eq!(res.status_code, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
