use histo_core::RecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{service} failed (status={status}): {message}")]
    Api {
        service: String,
        status: String,
        message: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("source '{0}' is already registered")]
    DuplicateSource(String),
}
