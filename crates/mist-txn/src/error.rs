use mist_types::{Digest, GlobalId};

/// Errors from transaction staging and encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxnError {
    /// The object is already staged (created, modified or deleted) in this
    /// transaction.
    #[error("object {0} is already staged in this transaction")]
    Duplicate(GlobalId),

    /// The object would become its own parent.
    #[error("object {0} cannot be its own parent")]
    InvalidParent(GlobalId),

    /// A field the digest covers has not been assigned yet.
    #[error("transaction is not sealed: {0} not assigned")]
    Unsealed(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A document references content bytes that were not supplied.
    #[error("missing content blob {0}")]
    MissingContent(Digest),

    /// Supplied content bytes do not hash to their key.
    #[error("content blob does not match its hash {0}")]
    ContentMismatch(Digest),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;
