//! Error types for the session store.
//!
//! Only two outcomes are domain-specific: a duplicate session ID on create
//! and the construction-time validation failures. Everything the storage
//! engine reports is passed through untouched as [`StoreError::Database`].
//! A missing record is never an error anywhere in this crate.

use thiserror::Error;

/// Errors produced by the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A session with the same ID already exists. Returned by create only;
    /// the store is left unchanged.
    #[error("session ID is already taken")]
    DuplicateId,

    /// The bucket name given at construction was empty.
    #[error("invalid bucket name")]
    InvalidBucket,

    /// The cleanup interval given at construction was negative.
    #[error("invalid cleanup interval")]
    InvalidInterval,

    /// An unexpected failure inside the storage engine (I/O error, closed
    /// handle, corrupted page). Never retried, never swallowed.
    #[error("database failure: {0}")]
    Database(#[source] redb::Error),

    /// A stored record could not be encoded or decoded.
    #[error("record encoding failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error is the duplicate-ID conflict sentinel.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateId)
    }
}

/// Result type alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

// Conversions from every redb error family, so `?` flows through the
// accessor layer without per-call mapping.

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Database(err.into())
    }
}
