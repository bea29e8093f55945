use thiserror::Error;

/// Service-level error taxonomy. Handlers map these onto HTTP statuses;
/// the mapping lives at the HTTP boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("authentication required")]
    AuthRequired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Rfc(#[from] kunai_rfc::error::RfcError),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("directory failure: {0}")]
    Directory(String),
}

impl From<kunai_store::StoreError> for ServiceError {
    fn from(e: kunai_store::StoreError) -> Self {
        match e {
            kunai_store::StoreError::NotFound(what) => Self::NotFound(what),
            kunai_store::StoreError::Conflict(what) => Self::Conflict(what),
            kunai_store::StoreError::Internal(what) => Self::Storage(what),
        }
    }
}

impl From<kunai_core::error::CoreError> for ServiceError {
    fn from(e: kunai_core::error::CoreError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
