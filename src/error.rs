//! Error taxonomy for the cache and pipeline.
//!
//! A closed set of error kinds, each with a fixed answer to "is it worth
//! retrying?". Connectivity failures (store or embedding backend) are
//! transient; everything else is a hard failure that retrying cannot fix.

use thiserror::Error;

/// All errors produced by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the store (pool exhausted, I/O failure, busy writer).
    #[error("store connection error: {0}")]
    StoreConnection(String),

    /// A query failed: bad SQL, constraint violation, missing row.
    #[error("query error: {0}")]
    Query(String),

    /// Could not reach the embedding backend (connect failure or timeout).
    #[error("embedding connection error: {0}")]
    EmbeddingConnection(String),

    /// The embedding model is missing or misconfigured on the backend.
    #[error("embedding model error: {0}")]
    EmbeddingModel(String),

    /// The backend answered, but with an unexpected status or a payload
    /// that does not match the configured dimensionality.
    #[error("embedding response error: {0}")]
    EmbeddingResponse(String),

    /// Text chunking failed on the given input.
    #[error("chunking error: {0}")]
    Chunking(String),
}

impl Error {
    /// Whether a retry with backoff has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreConnection(_) | Error::EmbeddingConnection(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Error::StoreConnection(e.to_string()),
            other => Error::Query(other.to_string()),
        }
    }
}

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
