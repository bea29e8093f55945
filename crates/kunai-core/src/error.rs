use thiserror::Error;

/// Errors raised by the core crate (path parsing, configuration).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid DAV path: {0}")]
    InvalidPath(String),

    #[error("unsafe path segment: {0:?}")]
    UnsafeSegment(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
