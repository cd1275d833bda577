//! Document store error types.

use thiserror::Error;

/// Result type for document store operations.
pub type DocStoreResult<T> = Result<T, DocStoreError>;

/// Errors that can occur talking to the document store.
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// No such document.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The file is not acceptable (only PDF documents are stored).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The store answered with an unexpected status.
    #[error("document store error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request-level failure (connect, send, body).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not parse.
    #[error("failed to parse response: {0}")]
    Parse(String),
}
