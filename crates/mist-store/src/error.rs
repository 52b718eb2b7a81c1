use std::path::PathBuf;

/// Errors from table store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store creation targeted a path that already exists.
    #[error("store already exists: {0}")]
    FileExists(PathBuf),

    /// `begin` was called while a transaction was already open.
    #[error("a storage transaction is already active")]
    TransactionActive,

    /// A write, `commit` or `rollback` was issued outside a transaction.
    #[error("no storage transaction is active")]
    NoTransaction,

    /// A row would violate a uniqueness constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The persisted snapshot is malformed or of an unknown format.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
