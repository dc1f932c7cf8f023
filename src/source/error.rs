//! Errors raised by content sources

use thiserror::Error;

/// Failure of a content source call
#[derive(Error, Debug)]
pub enum SourceError {
    /// No document has the requested identity
    #[error("No {doc_type} document with uid {uid:?}")]
    NotFound { doc_type: String, uid: String },

    /// Transport or server failure; never retried here
    #[error("Content source unavailable: {0}")]
    Unavailable(String),

    /// The payload does not match the document schema
    #[error("Malformed content at {path}: {message}")]
    Malformed { path: String, message: String },

    /// The query itself cannot be answered (bad page size, unknown ref, ...)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed {
                path: "response".to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}
