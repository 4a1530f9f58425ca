use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the persistence core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the backing relational driver.
    #[error("backend error: {0}")]
    Backend(#[from] rusqlite::Error),
    /// I/O error outside the driver.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A conflicting writer won; the operation was retried and still lost.
    #[error("concurrent modification during {0}")]
    ConcurrentModification(&'static str),
    /// Programming-contract violation (bad literal, unknown node kind).
    #[error("contract violation: {0}")]
    Contract(String),
    /// The store or connection has been closed.
    #[error("store is not open")]
    NotOpen,
    /// Schema creation or migration failed.
    #[error("schema migration failed: {0}")]
    Migration(String),
    /// The dialect has no SQL text for the requested statement key.
    #[error("dialect is missing statement {0}")]
    UnknownStatement(&'static str),
}

impl StoreError {
    /// Extended driver error code, when the error originated in the backend.
    pub fn backend_code(&self) -> Option<i32> {
        match self {
            StoreError::Backend(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }

    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        StoreError::Contract(msg.into())
    }
}
