use groovyscope_api::ApiError;
use groovyscope_groovy::GroovyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroovyscopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MSGPACK encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MSGPACK decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Parsing error: {0}")]
    Parsing(String),
    #[error("Index error: {0}")]
    Index(String),
    #[error("Resolution error: {0}")]
    Resolution(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Workspace is closed")]
    Closed,
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<GroovyError> for GroovyscopeError {
    fn from(err: GroovyError) -> Self {
        match err {
            GroovyError::Io(e) => GroovyscopeError::Io(e),
            GroovyError::Archive(e) => GroovyscopeError::Index(e.to_string()),
            GroovyError::Parsing(msg) => GroovyscopeError::Parsing(msg),
        }
    }
}

impl From<GroovyscopeError> for ApiError {
    fn from(err: GroovyscopeError) -> Self {
        match err {
            GroovyscopeError::Closed => ApiError::Closed,
            GroovyscopeError::InvalidState(msg) => ApiError::InvalidArgument(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GroovyscopeError>;
