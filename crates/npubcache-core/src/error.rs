//! Error types for npubcache

use thiserror::Error;

use crate::source::SourceError;

/// Main error type for npubcache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Profile was never loaded or referenced in the cache
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Remote profile source failed for a batch
    #[error("Fetch error: {0}")]
    Fetch(#[from] SourceError),

    /// Malformed public or secret key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Durable write or read failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Decryption of an account secret failed (wrong PIN, tampered blob)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// True for failures of a durable write or read.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CacheError::Storage(_)
                | CacheError::Database(_)
                | CacheError::Transaction(_)
                | CacheError::Table(_)
                | CacheError::StorageOp(_)
                | CacheError::Commit(_)
                | CacheError::Io(_)
        )
    }
}

/// Result type alias using CacheError
pub type CacheResult<T> = Result<T, CacheError>;
