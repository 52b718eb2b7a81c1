use std::time::Duration;

use mist_store::StoreError;
use mist_txn::TxnError;

/// Errors surfaced to mistDb callers.
///
/// Every variant carries a stable numeric [`code`](MistError::code) for
/// programmatic branching. Codes 1-5 are the validation taxonomy; higher
/// codes cover integrity, storage and scheduling failures.
#[derive(Debug, thiserror::Error)]
pub enum MistError {
    /// Store creation or restore targeted something that already exists.
    #[error("already exists: {0}")]
    FileExists(String),

    /// Self-parent, missing or deleted parent, or a parent cycle.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// An object or transaction referenced more than once.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Unknown transaction, object or content reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// Deleting an object that still has live children.
    #[error("not empty: {0}")]
    NotEmpty(String),

    /// A recomputed digest disagrees with the recorded one.
    #[error("hash mismatch: {0}")]
    HashMismatch(String),

    #[error("storage error: {0}")]
    Storage(StoreError),

    /// A queued lock request hit its deadline.
    #[error("timed out after {0:?} waiting for the store lock")]
    LockTimeout(Duration),

    /// A queued lock request was cancelled before it ran.
    #[error("lock request cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation was attempted on a transaction in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MistError {
    pub const FILE_EXISTS: u32 = 1;
    pub const INVALID_PARENT: u32 = 2;
    pub const DUPLICATE: u32 = 3;
    pub const NOT_FOUND: u32 = 4;
    pub const NOT_EMPTY: u32 = 5;
    pub const HASH_MISMATCH: u32 = 6;
    pub const STORAGE: u32 = 7;
    pub const LOCK_TIMEOUT: u32 = 8;
    pub const CANCELLED: u32 = 9;
    pub const SERIALIZATION: u32 = 10;
    pub const INVALID_STATE: u32 = 11;
    pub const CONFIG: u32 = 12;

    /// Stable numeric error code.
    pub fn code(&self) -> u32 {
        match self {
            Self::FileExists(_) => Self::FILE_EXISTS,
            Self::InvalidParent(_) => Self::INVALID_PARENT,
            Self::Duplicate(_) => Self::DUPLICATE,
            Self::NotFound(_) => Self::NOT_FOUND,
            Self::NotEmpty(_) => Self::NOT_EMPTY,
            Self::HashMismatch(_) => Self::HASH_MISMATCH,
            Self::Storage(_) => Self::STORAGE,
            Self::LockTimeout(_) => Self::LOCK_TIMEOUT,
            Self::Cancelled => Self::CANCELLED,
            Self::Serialization(_) => Self::SERIALIZATION,
            Self::InvalidState(_) => Self::INVALID_STATE,
            Self::Config(_) => Self::CONFIG,
        }
    }

    /// `true` for failures that may succeed when retried unchanged.
    /// Validation failures never are: the transaction must be restaged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout(_) | Self::Storage(StoreError::Io(_))
        )
    }
}

impl From<StoreError> for MistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::FileExists(path) => Self::FileExists(path.display().to_string()),
            other => Self::Storage(other),
        }
    }
}

impl From<TxnError> for MistError {
    fn from(err: TxnError) -> Self {
        match err {
            TxnError::Duplicate(id) => Self::Duplicate(format!("object {id} staged twice")),
            TxnError::InvalidParent(id) => {
                Self::InvalidParent(format!("object {id} cannot be its own parent"))
            }
            TxnError::Unsealed(field) => {
                Self::InvalidState(format!("transaction {field} not assigned"))
            }
            TxnError::MissingContent(hash) => Self::NotFound(format!("content blob {hash}")),
            TxnError::ContentMismatch(hash) => {
                Self::HashMismatch(format!("content blob does not hash to {hash}"))
            }
            TxnError::InvalidTimestamp(msg) | TxnError::Serialization(msg) => {
                Self::Serialization(msg)
            }
        }
    }
}

/// Result alias for mistDb operations.
pub type MistResult<T> = Result<T, MistError>;
